//! Tool version lookups

pub const VERSION_FUNCTION: &str = "krmgenVer";
pub const GENERATED_FUNCTION: &str = "krmgenGenerated";

/// Version of this build
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Marker for `generated-by` style labels, e.g. `krmgen-0.3.0`
pub fn generated() -> String {
    format!("krmgen-{}", version())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_marker() {
        assert!(generated().starts_with("krmgen-"));
        assert!(generated().ends_with(version()));
        assert!(semver::Version::parse(version()).is_ok());
    }
}
