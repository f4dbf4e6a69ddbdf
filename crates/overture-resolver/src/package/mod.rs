//! Package descriptors: concrete packages, their links, and alias
//! packages layered on top of them.

mod alias;
mod link;
mod package;

pub use alias::AliasPackage;
pub use link::{Link, LinkKind};
pub use package::{Package, PackageKind};
