//! Platform requirement handling.
//!
//! Platform packages (`php`, `ext-*`, `lib-*`, `composer-*`) describe the
//! runtime rather than installable code. Requirements on them can be
//! ignored wholesale or selectively before rule generation.

/// Returns true for runtime/extension package names.
pub fn is_platform_package(name: &str) -> bool {
    name == "php"
        || name.starts_with("php-")
        || name == "hhvm"
        || name.starts_with("ext-")
        || name.starts_with("lib-")
        || name == "composer"
        || name.starts_with("composer-")
}

/// Which platform requirements to drop before rule generation.
#[derive(Debug, Clone, Default)]
pub enum PlatformRequirementFilter {
    /// Keep every platform requirement.
    #[default]
    None,
    /// Drop all platform requirements.
    All,
    /// Drop requirements matching any of the listed names; a trailing `*`
    /// makes an entry a prefix pattern (`ext-*`).
    List(Vec<String>),
}

impl PlatformRequirementFilter {
    /// Build from the `ignore-platform-reqs` option shape: a bool or a
    /// list of names.
    pub fn ignore_all() -> Self {
        PlatformRequirementFilter::All
    }

    pub fn ignore_list(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        PlatformRequirementFilter::List(
            names.into_iter().map(|n| n.into().to_lowercase()).collect(),
        )
    }

    /// Whether a requirement on `name` should be dropped.
    pub fn ignores(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        match self {
            PlatformRequirementFilter::None => false,
            PlatformRequirementFilter::All => is_platform_package(&name),
            PlatformRequirementFilter::List(patterns) => {
                is_platform_package(&name)
                    && patterns.iter().any(|pattern| {
                        match pattern.strip_suffix('*') {
                            Some(prefix) => name.starts_with(prefix),
                            None => name == *pattern,
                        }
                    })
            }
        }
    }
}
