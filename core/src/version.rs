//! Build identification printed by `subchat version`.

/// Crate version, straight from the manifest.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Revision of the frame layout in [`crate::wire`]. Bump when a tag or payload changes.
pub const PROTOCOL_VERSION: u32 = 1;

pub const BUILD_PROFILE: &str = if cfg!(debug_assertions) {
    "debug"
} else {
    "release"
};

/// Human-readable banner, e.g. `Subchat v0.1.0 [debug]`.
pub fn version_string() -> String {
    match BUILD_PROFILE {
        "debug" => format!("Subchat v{} [debug]", VERSION),
        _ => format!("Subchat v{}", VERSION),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_banner_carries_manifest_version() {
        let banner = version_string();
        assert!(banner.starts_with(&format!("Subchat v{}", VERSION)));
        assert_eq!(banner.ends_with("[debug]"), cfg!(debug_assertions));
    }
}
