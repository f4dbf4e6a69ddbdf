use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::constraint::{Constraint, Op};
use crate::version::{Stability, Version};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionParserError {
    #[error("Invalid version string \"{0}\"")]
    InvalidVersion(String),
    #[error("Could not parse version constraint \"{0}\"")]
    InvalidConstraint(String),
}

lazy_static! {
    static ref VERSION_RE: Regex = Regex::new(
        r"(?i)^v?(\d{1,9})(?:\.(\d{1,9}))?(?:\.(\d{1,9}))?(?:\.(\d{1,9}))?(?:[._-]?(stable|beta|b|rc|alpha|a|patch|pl|p|dev)[._-]?(\d{1,9})?)?$"
    )
    .unwrap();
}

/// Parses version strings into normalized [`Version`]s and constraint
/// expressions into [`Constraint`]s.
///
/// Supported constraint syntax mirrors the package manager's:
/// `*`, exact versions, comparison operators (`=`, `==`, `!=`, `<>`,
/// `<`, `<=`, `>`, `>=`), tilde ranges (`~1.2`, `~=1.2`), caret ranges
/// (`^1.2`), x-ranges (`1.2.*`), hyphen ranges (`1.0 - 2.0`),
/// disjunction (`||`), conjunction (comma or whitespace), `@stability`
/// suffixes, and `dev-` branch names.
#[derive(Debug, Default, Clone)]
pub struct VersionParser;

impl VersionParser {
    pub fn new() -> Self {
        VersionParser
    }

    /// Whether a version string normalizes cleanly.
    pub fn is_valid(&self, version: &str) -> bool {
        self.normalize(version).is_ok()
    }

    /// Extract the stability implied by a version string.
    pub fn parse_stability(version: &str) -> Stability {
        match VersionParser::new().normalize(version) {
            Ok(v) => v.stability(),
            Err(_) => Stability::Stable,
        }
    }

    /// Normalize a version string into a [`Version`].
    ///
    /// `1.0` becomes `1.0.0.0`, suffixes like `-beta2` or `RC1` become
    /// stability markers, and `dev-<name>` becomes a branch version.
    pub fn normalize(&self, version: &str) -> Result<Version, VersionParserError> {
        let version = version.trim();
        if version.is_empty() {
            return Err(VersionParserError::InvalidVersion(version.to_string()));
        }

        let lower = version.to_lowercase();
        if let Some(branch) = lower.strip_prefix("dev-") {
            if branch.is_empty() {
                return Err(VersionParserError::InvalidVersion(version.to_string()));
            }
            return Ok(Version::branch(format!("dev-{}", branch)));
        }

        // Branch-style numeric versions: 1.0.x-dev / 1.x-dev normalize to
        // a numeric dev version of the prefix.
        if let Some(prefix) = lower
            .strip_suffix("-dev")
            .and_then(|p| p.strip_suffix(".x").or_else(|| p.strip_suffix(".*")))
        {
            let parts = parse_numeric_parts(prefix)
                .ok_or_else(|| VersionParserError::InvalidVersion(version.to_string()))?;
            return Ok(Version::numeric(parts, Stability::Dev, None));
        }

        let caps = VERSION_RE
            .captures(version)
            .ok_or_else(|| VersionParserError::InvalidVersion(version.to_string()))?;

        let seg = |i: usize| -> u64 {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>().unwrap_or(0))
                .unwrap_or(0)
        };
        let parts = [seg(1), seg(2), seg(3), seg(4)];

        let stability = match caps.get(5).map(|m| m.as_str().to_lowercase()) {
            Some(s) => match s.as_str() {
                "dev" => Stability::Dev,
                "alpha" | "a" => Stability::Alpha,
                "beta" | "b" => Stability::Beta,
                "rc" => Stability::RC,
                // patch releases sort with stable
                _ => Stability::Stable,
            },
            None => Stability::Stable,
        };
        let pre = caps
            .get(6)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .filter(|_| stability != Stability::Stable);

        Ok(Version::numeric(parts, stability, pre))
    }

    /// Parse a constraint expression.
    pub fn parse_constraints(&self, input: &str) -> Result<Constraint, VersionParserError> {
        let input = input.trim();
        if input.is_empty() || input == "*" || input.eq_ignore_ascii_case("x") {
            return Ok(Constraint::Any);
        }

        let mut or_groups = Vec::new();
        for group in split_or(input) {
            let group = group.trim();
            if group.is_empty() {
                return Err(VersionParserError::InvalidConstraint(input.to_string()));
            }
            or_groups.push(self.parse_and_group(group)?);
        }

        Ok(Constraint::or(or_groups))
    }

    fn parse_and_group(&self, group: &str) -> Result<Constraint, VersionParserError> {
        // Hyphen range: "1.0 - 2.0". The surrounding spaces distinguish it
        // from pre-release hyphens.
        if let Some((lo, hi)) = split_hyphen_range(group) {
            return self.parse_hyphen_range(lo, hi);
        }

        let raw: Vec<&str> = group
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        // "> 1.0" splits into an operator token and a version token;
        // stitch those pairs back together.
        let mut parts = Vec::new();
        let mut index = 0;
        while index < raw.len() {
            let token = raw[index];
            if is_bare_operator(token) && index + 1 < raw.len() {
                parts.push(self.parse_simple(&format!("{}{}", token, raw[index + 1]))?);
                index += 2;
            } else {
                parts.push(self.parse_simple(token)?);
                index += 1;
            }
        }
        if parts.is_empty() {
            return Err(VersionParserError::InvalidConstraint(group.to_string()));
        }
        Ok(Constraint::and(parts))
    }

    fn parse_simple(&self, token: &str) -> Result<Constraint, VersionParserError> {
        // Strip @stability suffixes: they select acceptable stability,
        // which the pool applies, not the version range.
        let token = match token.find('@') {
            Some(0) => return Ok(Constraint::Any),
            Some(idx) => &token[..idx],
            None => token,
        };
        let token = token.trim();
        if token.is_empty() || token == "*" {
            return Ok(Constraint::Any);
        }

        if token.to_lowercase().starts_with("dev-") {
            return Ok(Constraint::exact(self.normalize(token)?));
        }

        if let Some(rest) = strip_prefix_any(token, &["~=", "~"]) {
            return self.parse_tilde(rest.trim());
        }
        if let Some(rest) = token.strip_prefix('^') {
            return self.parse_caret(rest.trim());
        }

        for op_str in ["==", "!=", "<>", "<=", ">=", "=", "<", ">"] {
            if let Some(rest) = token.strip_prefix(op_str) {
                let op = Op::parse(op_str)
                    .ok_or_else(|| VersionParserError::InvalidConstraint(token.to_string()))?;
                let rest = rest.trim();
                if rest.to_lowercase().starts_with("dev-") || !has_wildcard(rest) {
                    return Ok(Constraint::primitive(op, self.normalize(rest)?));
                }
                // Operators on x-ranges degrade to the range boundary.
                let (lo, hi) = x_range_bounds(rest)
                    .ok_or_else(|| VersionParserError::InvalidConstraint(token.to_string()))?;
                return Ok(match op {
                    Op::Ge | Op::Gt => Constraint::primitive(op, lo),
                    Op::Lt | Op::Le => Constraint::primitive(op, hi),
                    _ => range(lo, hi),
                });
            }
        }

        if has_wildcard(token) {
            let (lo, hi) = x_range_bounds(token)
                .ok_or_else(|| VersionParserError::InvalidConstraint(token.to_string()))?;
            return Ok(range(lo, hi));
        }

        Ok(Constraint::exact(self.normalize(token)?))
    }

    /// `~1.2.3` allows the last given segment to grow: `>=1.2.3.0 <1.3.0.0`.
    fn parse_tilde(&self, version: &str) -> Result<Constraint, VersionParserError> {
        let segments = count_segments(version);
        let lo = self.normalize(version)?;
        let parts = lo
            .parts()
            .ok_or_else(|| VersionParserError::InvalidConstraint(version.to_string()))?;

        let bump_index = segments.saturating_sub(2).min(2);
        let mut hi_parts = [0u64; 4];
        hi_parts[..=bump_index].copy_from_slice(&parts[..=bump_index]);
        hi_parts[bump_index] += 1;

        Ok(range(lo, Version::numeric(hi_parts, Stability::Dev, None)))
    }

    /// `^1.2.3` allows semver-compatible growth: `>=1.2.3.0 <2.0.0.0`,
    /// with the usual pre-1.0 tightening (`^0.3` gives `<0.4.0.0`).
    fn parse_caret(&self, version: &str) -> Result<Constraint, VersionParserError> {
        let lo = self.normalize(version)?;
        let parts = lo
            .parts()
            .ok_or_else(|| VersionParserError::InvalidConstraint(version.to_string()))?;

        let mut hi_parts = [0u64; 4];
        if parts[0] > 0 || count_segments(version) == 1 {
            hi_parts[0] = parts[0] + 1;
        } else if parts[1] > 0 || count_segments(version) == 2 {
            hi_parts[0] = parts[0];
            hi_parts[1] = parts[1] + 1;
        } else {
            hi_parts[0] = parts[0];
            hi_parts[1] = parts[1];
            hi_parts[2] = parts[2] + 1;
        }

        Ok(range(lo, Version::numeric(hi_parts, Stability::Dev, None)))
    }

    fn parse_hyphen_range(&self, lo: &str, hi: &str) -> Result<Constraint, VersionParserError> {
        let lo_v = self.normalize(lo)?;
        let hi_segments = count_segments(hi);
        let hi_v = self.normalize(hi)?;

        // A partial upper bound widens to the next release of its last
        // given segment: "1.0 - 2.0" means "< 2.1".
        if hi_segments < 3 && !hi_v.is_branch() {
            let parts = hi_v
                .parts()
                .ok_or_else(|| VersionParserError::InvalidConstraint(hi.to_string()))?;
            let mut hi_parts = [0u64; 4];
            hi_parts[..hi_segments].copy_from_slice(&parts[..hi_segments]);
            hi_parts[hi_segments - 1] += 1;
            return Ok(range(lo_v, Version::numeric(hi_parts, Stability::Dev, None)));
        }

        Ok(Constraint::and(vec![
            Constraint::primitive(Op::Ge, lo_v),
            Constraint::primitive(Op::Le, hi_v),
        ]))
    }
}

fn range(lo: Version, hi: Version) -> Constraint {
    Constraint::and(vec![
        Constraint::primitive(Op::Ge, lo),
        Constraint::primitive(Op::Lt, hi),
    ])
}

fn strip_prefix_any<'a>(s: &'a str, prefixes: &[&str]) -> Option<&'a str> {
    prefixes.iter().find_map(|p| s.strip_prefix(p))
}

fn is_bare_operator(token: &str) -> bool {
    matches!(
        token,
        "==" | "!=" | "<>" | "<=" | ">=" | "=" | "<" | ">" | "~" | "~=" | "^"
    )
}

fn has_wildcard(s: &str) -> bool {
    s.contains('*') || s.to_lowercase().split('.').any(|seg| seg == "x")
}

fn count_segments(version: &str) -> usize {
    let numeric: &str = version
        .split(|c: char| c == '-' || c == '_' || c == '+')
        .next()
        .unwrap_or(version);
    numeric
        .trim_start_matches(['v', 'V'])
        .split('.')
        .filter(|s| s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty())
        .count()
        .max(1)
}

fn parse_numeric_parts(version: &str) -> Option<[u64; 4]> {
    let mut parts = [0u64; 4];
    let trimmed = version.trim_start_matches(['v', 'V']);
    for (i, seg) in trimmed.split('.').enumerate() {
        if i >= 4 {
            return None;
        }
        parts[i] = seg.parse().ok()?;
    }
    Some(parts)
}

/// Bounds for an x-range like `1.2.*`.
fn x_range_bounds(token: &str) -> Option<(Version, Version)> {
    let prefix: Vec<u64> = token
        .trim_start_matches(['v', 'V'])
        .split('.')
        .take_while(|seg| seg.chars().all(|c| c.is_ascii_digit()) && !seg.is_empty())
        .map(|seg| seg.parse().unwrap_or(0))
        .collect();
    if prefix.is_empty() || prefix.len() > 3 {
        return None;
    }
    Some(bounds_for_prefix(&prefix))
}

fn bounds_for_prefix(prefix: &[u64]) -> (Version, Version) {
    let mut lo = [0u64; 4];
    lo[..prefix.len()].copy_from_slice(prefix);
    let mut hi = [0u64; 4];
    hi[..prefix.len()].copy_from_slice(prefix);
    hi[prefix.len() - 1] += 1;
    (
        Version::numeric(lo, Stability::Dev, None),
        Version::numeric(hi, Stability::Dev, None),
    )
}

fn split_or(input: &str) -> Vec<&str> {
    input.split("||").flat_map(|part| part.split('|')).collect()
}

/// Split "1.0 - 2.0" into its two endpoints. The hyphen must be
/// surrounded by whitespace.
fn split_hyphen_range(group: &str) -> Option<(&str, &str)> {
    let idx = group.find(" - ")?;
    let (lo, rest) = group.split_at(idx);
    Some((lo.trim(), rest[3..].trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> VersionParser {
        VersionParser::new()
    }

    fn v(s: &str) -> Version {
        parser().normalize(s).unwrap()
    }

    fn c(s: &str) -> Constraint {
        parser().parse_constraints(s).unwrap()
    }

    #[test]
    fn test_normalize_plain() {
        assert_eq!(v("1.0.0"), Version::release(1, 0, 0, 0));
        assert_eq!(v("1.2"), Version::release(1, 2, 0, 0));
        assert_eq!(v("v2.0.4.1"), Version::release(2, 0, 4, 1));
        assert_eq!(v("10"), Version::release(10, 0, 0, 0));
    }

    #[test]
    fn test_normalize_stability_suffixes() {
        assert_eq!(
            v("1.0.0-beta2"),
            Version::numeric([1, 0, 0, 0], Stability::Beta, Some(2))
        );
        assert_eq!(
            v("1.0.0RC1"),
            Version::numeric([1, 0, 0, 0], Stability::RC, Some(1))
        );
        assert_eq!(
            v("1.0.0-alpha"),
            Version::numeric([1, 0, 0, 0], Stability::Alpha, None)
        );
        assert_eq!(
            v("2.0-dev"),
            Version::numeric([2, 0, 0, 0], Stability::Dev, None)
        );
        // patch releases stay stable
        assert_eq!(v("1.0.0-patch1"), Version::release(1, 0, 0, 0));
    }

    #[test]
    fn test_normalize_branches() {
        assert_eq!(v("dev-main"), Version::branch("dev-main"));
        assert_eq!(v("DEV-Feature"), Version::branch("dev-feature"));
        assert_eq!(
            v("1.0.x-dev"),
            Version::numeric([1, 0, 0, 0], Stability::Dev, None)
        );
    }

    #[test]
    fn test_normalize_fails() {
        assert!(parser().normalize("").is_err());
        assert!(parser().normalize("not a version").is_err());
        assert!(parser().normalize("1.0.0.0.0").is_err());
    }

    #[test]
    fn test_parse_stability() {
        assert_eq!(VersionParser::parse_stability("1.0"), Stability::Stable);
        assert_eq!(VersionParser::parse_stability("1.0-beta1"), Stability::Beta);
        assert_eq!(VersionParser::parse_stability("dev-main"), Stability::Dev);
    }

    #[test]
    fn test_parse_any() {
        assert_eq!(c("*"), Constraint::Any);
        assert_eq!(c(""), Constraint::Any);
    }

    #[test]
    fn test_parse_exact_and_operators() {
        assert!(c("1.0.0").matches_version(&v("1.0.0")));
        assert!(!c("1.0.0").matches_version(&v("1.0.1")));
        assert!(c(">=1.0").matches_version(&v("1.5")));
        assert!(!c(">=1.0").matches_version(&v("0.9")));
        assert!(c("!=1.0").matches_version(&v("1.1")));
        assert!(!c("!=1.0").matches_version(&v("1.0")));
        assert!(c("<2").matches_version(&v("1.9.9")));
    }

    #[test]
    fn test_parse_tilde() {
        let t = c("~1.2.3");
        assert!(t.matches_version(&v("1.2.3")));
        assert!(t.matches_version(&v("1.2.9")));
        assert!(!t.matches_version(&v("1.3.0")));

        let t = c("~1.2");
        assert!(t.matches_version(&v("1.2.0")));
        assert!(t.matches_version(&v("1.9")));
        assert!(!t.matches_version(&v("2.0")));

        // ~= is the same range
        assert_eq!(c("~=1.2"), c("~1.2"));
    }

    #[test]
    fn test_parse_caret() {
        let t = c("^1.2.3");
        assert!(t.matches_version(&v("1.2.3")));
        assert!(t.matches_version(&v("1.9.0")));
        assert!(!t.matches_version(&v("2.0.0")));

        let t = c("^0.3");
        assert!(t.matches_version(&v("0.3.2")));
        assert!(!t.matches_version(&v("0.4.0")));
    }

    #[test]
    fn test_parse_x_range() {
        let t = c("1.2.*");
        assert!(t.matches_version(&v("1.2.0")));
        assert!(t.matches_version(&v("1.2.9")));
        assert!(!t.matches_version(&v("1.3.0")));

        let t = c("1.x");
        assert!(t.matches_version(&v("1.9.9")));
        assert!(!t.matches_version(&v("2.0")));
    }

    #[test]
    fn test_parse_hyphen_range() {
        let t = c("1.0 - 2.0");
        assert!(t.matches_version(&v("1.0.0")));
        assert!(t.matches_version(&v("2.0.9")));
        assert!(!t.matches_version(&v("2.1.0")));

        let t = c("1.0.0 - 2.1.0");
        assert!(t.matches_version(&v("2.1.0")));
        assert!(!t.matches_version(&v("2.1.1")));
    }

    #[test]
    fn test_parse_or_and() {
        let t = c("^1.0 || ^2.0");
        assert!(t.matches_version(&v("1.5")));
        assert!(t.matches_version(&v("2.5")));
        assert!(!t.matches_version(&v("3.0")));

        let t = c(">=1.0 <2.0");
        assert!(t.matches_version(&v("1.5")));
        assert!(!t.matches_version(&v("2.0")));

        let t = c(">=1.0,<2.0");
        assert!(t.matches_version(&v("1.5")));

        // spaced operators stitch back together
        let t = c(">= 1.0 < 2.0");
        assert!(t.matches_version(&v("1.5")));
        assert!(!t.matches_version(&v("2.0")));
    }

    #[test]
    fn test_parse_branch_constraint() {
        let t = c("dev-main");
        assert!(t.matches_version(&Version::branch("dev-main")));
        assert!(!t.matches_version(&v("1.0")));
    }

    #[test]
    fn test_stability_flag_stripped() {
        let t = c("^1.0@dev");
        assert!(t.matches_version(&v("1.5")));
        assert_eq!(c("@dev"), Constraint::Any);
    }

    #[test]
    fn test_constraint_intersection_via_parser() {
        assert!(c(">=1.0").matches(&c("<2.0")));
        assert!(!c(">=2.0").matches(&c("<1.0")));
        assert!(c("^1.2").matches(&c("1.4.0")));
        assert!(!c("^1.2").matches(&c("2.0.0")));
    }

    #[test]
    fn test_invalid_constraints() {
        assert!(parser().parse_constraints(">=foo").is_err());
        assert!(parser().parse_constraints("~").is_err());
    }
}
