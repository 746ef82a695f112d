//! Near-duplicate space names
//!
//! A new space is rejected when its name is already taken, or when too many
//! existing names sit within a small edit distance of it. Similar names that
//! stay under the cap are kept on the space as advisory links.

use crate::wire::SpaceErrorReason;
use std::collections::BTreeSet;

/// Levenshtein distance over Unicode scalar values
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// Rejects space names that crowd existing ones
#[derive(Clone, Copy, Debug)]
pub struct TopicDeduplicator {
    max_distance: usize,
    cap: usize,
}

impl TopicDeduplicator {
    pub fn new(max_distance: usize, cap: usize) -> Self {
        Self { max_distance, cap }
    }

    /// Existing names within the distance bound of `name`.
    ///
    /// Fails with `NameTaken` on an exact match and with `TooManySimilar`
    /// once the number of similar names reaches the cap.
    pub fn similar_names<'a, I>(
        &self,
        name: &str,
        existing: I,
    ) -> Result<BTreeSet<String>, SpaceErrorReason>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut similar = BTreeSet::new();
        for candidate in existing {
            if candidate == name {
                return Err(SpaceErrorReason::NameTaken);
            }
            if levenshtein(candidate, name) <= self.max_distance {
                similar.insert(candidate.to_string());
            }
        }

        if similar.len() >= self.cap {
            return Err(SpaceErrorReason::TooManySimilar);
        }
        Ok(similar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("alpha", "alpa"), 1);
        assert_eq!(levenshtein("héllo", "hello"), 1);
    }

    #[test]
    fn test_under_cap_records_similar_names() {
        let dedup = TopicDeduplicator::new(3, 5);
        let similar = dedup.similar_names("alpha", ["alpa", "alpah", "zzzzzzzzzz"]).unwrap();
        assert_eq!(similar, ["alpa", "alpah"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn test_too_many_similar_rejected() {
        let dedup = TopicDeduplicator::new(3, 5);
        let existing = ["alpha", "alpa", "alpah", "alpaa", "alphaa"];
        assert_eq!(
            dedup.similar_names("alphx", existing),
            Err(SpaceErrorReason::TooManySimilar)
        );
    }

    #[test]
    fn test_distant_name_accepted_with_no_links() {
        let dedup = TopicDeduplicator::new(3, 5);
        let existing = ["alpha", "alpa", "alpah", "alpaa", "alphaa"];
        assert!(dedup.similar_names("gardening", existing).unwrap().is_empty());
    }

    #[test]
    fn test_exact_name_taken() {
        let dedup = TopicDeduplicator::new(3, 5);
        assert_eq!(dedup.similar_names("root", ["root"]), Err(SpaceErrorReason::NameTaken));
    }
}
