use std::fmt;

use chrono::{DateTime, Utc};
use overture_semver::{Constraint, Stability, Version, VersionParser, VersionParserError};

use super::link::{Link, LinkKind};

/// The install payload class of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageKind {
    #[default]
    Library,
    /// Metapackages carry only links; they have no install payload.
    Metapackage,
}

/// An immutable package descriptor.
///
/// `(name, version)` identifies a candidate, but the pool keeps packages
/// with the same name and version from different repositories distinct by
/// id, so equality here is metadata equality only.
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    name: String,
    pretty_name: String,
    version: Version,
    pretty_version: String,
    kind: PackageKind,
    requires: Vec<Link>,
    dev_requires: Vec<Link>,
    conflicts: Vec<Link>,
    replaces: Vec<Link>,
    provides: Vec<Link>,
    time: Option<DateTime<Utc>>,
}

impl Package {
    /// Create a package from a pretty name and an already-normalized
    /// version.
    pub fn new(pretty_name: impl Into<String>, version: Version) -> Self {
        let pretty_name = pretty_name.into();
        let pretty_version = version.to_string();
        Package {
            name: pretty_name.to_lowercase(),
            pretty_name,
            version,
            pretty_version,
            kind: PackageKind::Library,
            requires: Vec::new(),
            dev_requires: Vec::new(),
            conflicts: Vec::new(),
            replaces: Vec::new(),
            provides: Vec::new(),
            time: None,
        }
    }

    /// Create a package by normalizing a version string, keeping the
    /// original spelling as the pretty version.
    pub fn parse(
        pretty_name: impl Into<String>,
        version: &str,
    ) -> Result<Self, VersionParserError> {
        let parsed = VersionParser::new().normalize(version)?;
        let mut package = Package::new(pretty_name, parsed);
        package.pretty_version = version.to_string();
        Ok(package)
    }

    pub fn set_kind(&mut self, kind: PackageKind) {
        self.kind = kind;
    }

    pub fn set_time(&mut self, time: Option<DateTime<Utc>>) {
        self.time = time;
    }

    pub fn add_link(&mut self, link: Link) {
        match link.kind() {
            LinkKind::Require => self.requires.push(link),
            LinkKind::DevRequire => self.dev_requires.push(link),
            LinkKind::Conflict => self.conflicts.push(link),
            LinkKind::Replace => self.replaces.push(link),
            LinkKind::Provide => self.provides.push(link),
        }
    }

    /// Parse and attach a link; convenience used by the lock reader and
    /// repository loaders. The `self.version` spelling resolves to this
    /// package's own version (aliases rewrite it again to theirs).
    pub fn add_link_str(
        &mut self,
        target: &str,
        kind: LinkKind,
        constraint: &str,
    ) -> Result<(), VersionParserError> {
        let parsed = if constraint == "self.version" {
            Constraint::exact(self.version.clone())
        } else {
            VersionParser::new().parse_constraints(constraint)?
        };
        self.add_link(Link::new(target, kind, parsed, constraint));
        Ok(())
    }

    /// Lowercased name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pretty_name(&self) -> &str {
        &self.pretty_name
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

    pub fn kind(&self) -> PackageKind {
        self.kind
    }

    pub fn is_metapackage(&self) -> bool {
        self.kind == PackageKind::Metapackage
    }

    pub fn time(&self) -> Option<&DateTime<Utc>> {
        self.time.as_ref()
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

    /// The vendor prefix of `vendor/package` names.
    pub fn vendor(&self) -> Option<&str> {
        self.name.split_once('/').map(|(vendor, _)| vendor)
    }

    /// All names this package occupies: its own, plus replace/provide
    /// targets when `include_provided` is set.
    pub fn get_names(&self, include_provided: bool) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if include_provided {
            for link in self.replaces.iter().chain(self.provides.iter()) {
                if !names.iter().any(|n| n == link.target()) {
                    names.push(link.target().to_string());
                }
            }
        }
        names
    }

    /// The constraint at which this package occupies `name` via a replace
    /// or provide link, with `self.version` already resolved.
    pub fn provided_constraint_for(&self, name: &str) -> Option<Constraint> {
        self.replaces
            .iter()
            .chain(self.provides.iter())
            .find(|link| link.target() == name)
            .map(|link| link.constraint().clone())
    }

    /// `"name version"` form used in diagnostics.
    pub fn pretty_string(&self) -> String {
        format!("{} {}", self.pretty_name, self.pretty_version)
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}
