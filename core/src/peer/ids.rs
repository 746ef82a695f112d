//! Request identifier allocation
//!
//! Hands out compact wire identifiers drawn at random from the 32-bit space.
//! An identifier stays reserved from `allocate` until `release`; released
//! identifiers go to the back of the free queue so a late reply for a
//! timed-out request is unlikely to hit the next request.

use crate::types::RequestId;
use rand::Rng;
use std::collections::{HashMap, VecDeque};

/// Number of fresh identifiers synthesized when the pool runs dry
const REFILL_BATCH: usize = 16;

/// Pool of identifiers with optional data attached to in-use ones
#[derive(Debug)]
pub struct IdAllocator<T> {
    free: VecDeque<RequestId>,
    in_use: HashMap<RequestId, Option<T>>,
    batch: usize,
}

impl<T> IdAllocator<T> {
    pub fn new() -> Self {
        Self::with_batch(REFILL_BATCH)
    }

    pub fn with_batch(batch: usize) -> Self {
        Self {
            free: VecDeque::new(),
            in_use: HashMap::new(),
            batch: batch.max(1),
        }
    }

    /// Reserve an identifier that is not currently in flight
    pub fn allocate(&mut self) -> RequestId {
        let id = self.free.pop_front().unwrap_or_else(|| self.refill());
        self.in_use.insert(id, None);
        id
    }

    /// Return an identifier to the pool. No-op if it is not in use.
    pub fn release(&mut self, id: RequestId) -> bool {
        if self.in_use.remove(&id).is_none() {
            return false;
        }
        self.free.push_back(id);
        true
    }

    /// Attach data to an in-use identifier
    pub fn put(&mut self, id: RequestId, value: T) -> bool {
        match self.in_use.get_mut(&id) {
            Some(slot) => {
                *slot = Some(value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: RequestId) -> Option<&T> {
        self.in_use.get(&id).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: RequestId) -> Option<&mut T> {
        self.in_use.get_mut(&id).and_then(Option::as_mut)
    }

    pub fn is_in_use(&self, id: RequestId) -> bool {
        self.in_use.contains_key(&id)
    }

    /// Identifiers currently allocated and not released
    pub fn in_flight(&self) -> usize {
        self.in_use.len()
    }

    /// Queue `batch - 1` fresh identifiers and return one more for immediate use
    fn refill(&mut self) -> RequestId {
        for _ in 1..self.batch {
            let id = self.fresh_id();
            self.free.push_back(id);
        }
        self.fresh_id()
    }

    fn fresh_id(&self) -> RequestId {
        let mut rng = rand::thread_rng();
        loop {
            let candidate = RequestId(rng.gen());
            if candidate.is_unsolicited()
                || self.in_use.contains_key(&candidate)
                || self.free.contains(&candidate)
            {
                continue;
            }
            return candidate;
        }
    }
}

impl<T> Default for IdAllocator<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_allocated_ids_are_unique() {
        let mut ids = IdAllocator::<()>::with_batch(4);
        let mut seen = HashSet::new();
        for _ in 0..1_000 {
            let id = ids.allocate();
            assert!(!id.is_unsolicited());
            assert!(seen.insert(id), "duplicate in-flight id {}", id);
        }
        assert_eq!(ids.in_flight(), 1_000);
    }

    #[test]
    fn test_release_is_noop_for_unknown_id() {
        let mut ids = IdAllocator::<u8>::new();
        let id = ids.allocate();
        assert!(ids.release(id));
        assert!(!ids.release(id));
        assert!(!ids.release(RequestId(12345)));
        assert!(!ids.is_in_use(id));
    }

    #[test]
    fn test_released_id_goes_to_back_of_queue() {
        let mut ids = IdAllocator::<()>::with_batch(4);
        let first = ids.allocate();
        ids.release(first);

        // Three ids from the original batch are handed out before the released one
        for _ in 0..3 {
            assert_ne!(ids.allocate(), first);
        }
        assert_eq!(ids.allocate(), first);
    }

    #[test]
    fn test_put_and_get() {
        let mut ids = IdAllocator::new();
        let id = ids.allocate();
        assert_eq!(ids.get(id), None);

        assert!(ids.put(id, "payload"));
        assert_eq!(ids.get(id), Some(&"payload"));

        if let Some(value) = ids.get_mut(id) {
            *value = "changed";
        }
        assert_eq!(ids.get(id), Some(&"changed"));

        ids.release(id);
        assert!(!ids.put(id, "late"));
        assert_eq!(ids.get(id), None);
    }

    #[test]
    fn test_in_use_id_never_reissued() {
        let mut ids = IdAllocator::<()>::with_batch(1);
        let held = ids.allocate();
        for _ in 0..200 {
            let id = ids.allocate();
            assert_ne!(id, held);
            ids.release(id);
        }
        assert!(ids.is_in_use(held));
    }
}
