// src/spec/version.rs

//! Version numbers and version range constraints.
//!
//! Package versions are dotted numeric tuples (`1.0`, `5.2.1`, `2024.1`),
//! ordered component-wise with missing trailing components sorting first
//! (`1.0 < 1.0.1 < 1.1`). Constraints are ranges with independently
//! inclusive/exclusive lower and upper bounds, which is enough to express
//! every form the spec grammar accepts (`@2.0:`, `@:1.9`, `@1.5:2.0`,
//! `@=2.1`, `>=2.0`, `<2.0`).

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::SolveError;

/// A concrete package version: ordered dotted numeric components.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<u64>);

impl Version {
    pub fn new(components: Vec<u64>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

impl FromStr for Version {
    type Err = SolveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SolveError::MalformedSpec(
                "empty version string".to_string(),
            ));
        }
        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u64>().map_err(|_| {
                    SolveError::MalformedSpec(format!(
                        "invalid version component '{part}' in '{s}'"
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Version(components))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// One end of a version range: the bound version and whether it is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: Version,
    inclusive: bool,
}

/// A range constraint over versions.
///
/// `min`/`max` of `None` means unbounded on that side; the default value
/// allows every version.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionConstraint {
    min: Option<Bound>,
    max: Option<Bound>,
}

impl VersionConstraint {
    /// Constraint satisfied by any version.
    pub fn any() -> Self {
        Self::default()
    }

    /// Constraint satisfied by exactly one version.
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(Bound {
                version: version.clone(),
                inclusive: true,
            }),
            max: Some(Bound {
                version,
                inclusive: true,
            }),
        }
    }

    /// True if no bound has been placed on either side.
    pub fn is_any(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Parse a constraint token.
    ///
    /// Accepted forms:
    /// - colon ranges: `1.5:2.0`, `2.0:`, `:1.9`, `:` (any)
    /// - operators: `>=2.0`, `>2.0`, `<=2.0`, `<2.0`, `=2.1`
    /// - a bare version (`2.1`), meaning exactly that version
    pub fn parse(s: &str) -> Result<Self, SolveError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(SolveError::MalformedSpec(
                "empty version constraint".to_string(),
            ));
        }

        if let Some(rest) = s.strip_prefix(">=") {
            return Ok(Self {
                min: Some(Bound {
                    version: rest.parse()?,
                    inclusive: true,
                }),
                max: None,
            });
        }
        if let Some(rest) = s.strip_prefix('>') {
            return Ok(Self {
                min: Some(Bound {
                    version: rest.parse()?,
                    inclusive: false,
                }),
                max: None,
            });
        }
        if let Some(rest) = s.strip_prefix("<=") {
            return Ok(Self {
                min: None,
                max: Some(Bound {
                    version: rest.parse()?,
                    inclusive: true,
                }),
            });
        }
        if let Some(rest) = s.strip_prefix('<') {
            return Ok(Self {
                min: None,
                max: Some(Bound {
                    version: rest.parse()?,
                    inclusive: false,
                }),
            });
        }
        if let Some(rest) = s.strip_prefix('=') {
            return Ok(Self::exact(rest.parse()?));
        }

        if let Some((lo, hi)) = s.split_once(':') {
            let min = if lo.is_empty() {
                None
            } else {
                Some(Bound {
                    version: lo.parse()?,
                    inclusive: true,
                })
            };
            let max = if hi.is_empty() {
                None
            } else {
                Some(Bound {
                    version: hi.parse()?,
                    inclusive: true,
                })
            };
            return Ok(Self { min, max });
        }

        Ok(Self::exact(s.parse()?))
    }

    /// True if `version` lies within this range.
    pub fn allows(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            match version.cmp(&min.version) {
                std::cmp::Ordering::Less => return false,
                std::cmp::Ordering::Equal if !min.inclusive => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(&max.version) {
                std::cmp::Ordering::Greater => return false,
                std::cmp::Ordering::Equal if !max.inclusive => return false,
                _ => {}
            }
        }
        true
    }

    /// Intersect two ranges, keeping the tighter bound on each side.
    pub fn intersect(&self, other: &Self) -> Self {
        Self {
            min: tighter(self.min.as_ref(), other.min.as_ref(), true),
            max: tighter(self.max.as_ref(), other.max.as_ref(), false),
        }
    }

    /// True if the range clearly contains no version at all.
    pub fn is_empty_range(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => match min.version.cmp(&max.version) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Equal => !(min.inclusive && max.inclusive),
                std::cmp::Ordering::Less => false,
            },
            _ => false,
        }
    }
}

/// Pick the tighter of two optional bounds.
///
/// For lower bounds (`lower = true`) the greater version wins, for upper
/// bounds the smaller one; at equal versions the exclusive bound is tighter.
fn tighter(a: Option<&Bound>, b: Option<&Bound>, lower: bool) -> Option<Bound> {
    match (a, b) {
        (None, None) => None,
        (Some(x), None) | (None, Some(x)) => Some(x.clone()),
        (Some(x), Some(y)) => {
            let ord = x.version.cmp(&y.version);
            let pick_x = match ord {
                std::cmp::Ordering::Equal => !x.inclusive || y.inclusive,
                std::cmp::Ordering::Greater => lower,
                std::cmp::Ordering::Less => !lower,
            };
            Some(if pick_x { x.clone() } else { y.clone() })
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.min, &self.max) {
            (None, None) => write!(f, "any"),
            (Some(min), Some(max))
                if min.version == max.version && min.inclusive && max.inclusive =>
            {
                write!(f, "={}", min.version)
            }
            (min, max) => {
                let mut parts = Vec::new();
                if let Some(b) = min {
                    let op = if b.inclusive { ">=" } else { ">" };
                    parts.push(format!("{op}{}", b.version));
                }
                if let Some(b) = max {
                    let op = if b.inclusive { "<=" } else { "<" };
                    parts.push(format!("{op}{}", b.version));
                }
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl<'de> Deserialize<'de> for VersionConstraint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        VersionConstraint::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn version_ordering_is_componentwise() {
        assert!(v("1.0") < v("1.0.1"));
        assert!(v("1.0.1") < v("1.1"));
        assert!(v("2.0") < v("2.1"));
        assert!(v("4.2.2") < v("5.1.1"));
        assert_eq!(v("2.0"), v("2.0"));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!("".parse::<Version>().is_err());
        assert!("1.x".parse::<Version>().is_err());
        assert!(VersionConstraint::parse("").is_err());
    }

    #[test]
    fn colon_ranges_are_inclusive() {
        let c = VersionConstraint::parse("1.5:2.0").unwrap();
        assert!(c.allows(&v("1.5")));
        assert!(c.allows(&v("2.0")));
        assert!(c.allows(&v("1.9.9")));
        assert!(!c.allows(&v("2.0.1")));
        assert!(!c.allows(&v("1.4")));

        let open = VersionConstraint::parse("2.0:").unwrap();
        assert!(open.allows(&v("2.0")));
        assert!(open.allows(&v("99.0")));
        assert!(!open.allows(&v("1.9")));
    }

    #[test]
    fn operator_forms() {
        let ge = VersionConstraint::parse(">=2.0").unwrap();
        assert!(ge.allows(&v("2.0")) && ge.allows(&v("2.1")) && !ge.allows(&v("1.0")));

        let lt = VersionConstraint::parse("<2.0").unwrap();
        assert!(lt.allows(&v("1.9")) && !lt.allows(&v("2.0")));

        let exact = VersionConstraint::parse("2.1").unwrap();
        assert!(exact.allows(&v("2.1")) && !exact.allows(&v("2.1.1")));
    }

    #[test]
    fn disjoint_ranges_intersect_to_empty() {
        let lo = VersionConstraint::parse("<2.0").unwrap();
        let hi = VersionConstraint::parse(">=2.0").unwrap();
        assert!(lo.intersect(&hi).is_empty_range());

        let a = VersionConstraint::parse("1.0:1.5").unwrap();
        let b = VersionConstraint::parse("1.2:2.0").unwrap();
        let both = a.intersect(&b);
        assert!(!both.is_empty_range());
        assert!(both.allows(&v("1.3")));
        assert!(!both.allows(&v("1.0")));
        assert!(!both.allows(&v("1.9")));
    }

    #[test]
    fn display_round_trips_meaning() {
        assert_eq!(VersionConstraint::any().to_string(), "any");
        assert_eq!(VersionConstraint::parse("2.1").unwrap().to_string(), "=2.1");
        assert_eq!(
            VersionConstraint::parse("1.5:2.0").unwrap().to_string(),
            ">=1.5,<=2.0"
        );
    }
}
