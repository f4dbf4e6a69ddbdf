use std::fmt;
use std::sync::Arc;

use overture_semver::{Constraint, Stability, Version};

use super::link::Link;
use super::package::Package;

/// The pretty-constraint spelling that aliases rewrite to their own
/// version.
const SELF_VERSION: &str = "self.version";

/// A package that re-exports another package's links under a different
/// declared version.
///
/// Links whose constraint was written as `self.version` are rewritten to
/// an exact match on the alias version; the original pretty form is kept
/// for diagnostics.
#[derive(Debug, Clone)]
pub struct AliasPackage {
    of: Arc<Package>,
    version: Version,
    pretty_version: String,
    root_alias: bool,
    requires: Vec<Link>,
    dev_requires: Vec<Link>,
    conflicts: Vec<Link>,
    replaces: Vec<Link>,
    provides: Vec<Link>,
}

impl AliasPackage {
    pub fn new(of: Arc<Package>, version: Version, pretty_version: impl Into<String>) -> Self {
        let rewrite = |links: &[Link]| -> Vec<Link> {
            links
                .iter()
                .map(|link| {
                    if link.pretty_constraint() == SELF_VERSION {
                        link.with_constraint(Constraint::exact(version.clone()), SELF_VERSION)
                    } else {
                        link.clone()
                    }
                })
                .collect()
        };

        AliasPackage {
            requires: rewrite(of.requires()),
            dev_requires: rewrite(of.dev_requires()),
            conflicts: rewrite(of.conflicts()),
            replaces: rewrite(of.replaces()),
            provides: rewrite(of.provides()),
            of,
            version,
            pretty_version: pretty_version.into(),
            root_alias: false,
        }
    }

    pub fn set_root_alias(&mut self, root_alias: bool) {
        self.root_alias = root_alias;
    }

    /// Whether this alias was declared by the root package; root aliases
    /// bias policy selection.
    pub fn is_root_alias(&self) -> bool {
        self.root_alias
    }

    /// The package this alias re-exports.
    pub fn alias_of(&self) -> &Arc<Package> {
        &self.of
    }

    pub fn name(&self) -> &str {
        self.of.name()
    }

    pub fn pretty_name(&self) -> &str {
        self.of.pretty_name()
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn pretty_version(&self) -> &str {
        &self.pretty_version
    }

    pub fn stability(&self) -> Stability {
        self.version.stability()
    }

    pub fn requires(&self) -> &[Link] {
        &self.requires
    }

    pub fn dev_requires(&self) -> &[Link] {
        &self.dev_requires
    }

    pub fn conflicts(&self) -> &[Link] {
        &self.conflicts
    }

    pub fn replaces(&self) -> &[Link] {
        &self.replaces
    }

    pub fn provides(&self) -> &[Link] {
        &self.provides
    }

    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name(), self.pretty_version)
    }
}

impl fmt::Display for AliasPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{} (alias of {})", self.name(), self.version, self.of.version())
    }
}
