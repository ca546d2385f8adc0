//! Version specifiers and requirement strings.
//!
//! - [`Specifier`]: one clause such as `~=2.0` or `!=1.3.*`
//! - [`SpecifierSet`]: comma-separated conjunction of clauses
//! - [`Requirement`]: `name[extras] specifiers ; marker` or `name @ url`
//!
//! Specifiers admit pre-releases: `requires` keys are compared against app
//! tags as published. Hiding pre-release app versions is up to the app.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::AppError;
use crate::pep440::PackageVersion;

// ============================================================================
// Specifier
// ============================================================================

/// Comparison operator of a specifier clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Compatible,
    Equal,
    NotEqual,
    LessEqual,
    GreaterEqual,
    Less,
    Greater,
    Arbitrary,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::Compatible => "~=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::LessEqual => "<=",
            Operator::GreaterEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Arbitrary => "===",
        }
    }
}

/// A single version clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub operator: Operator,
    /// The version text as written, without the operator.
    pub version: String,
    /// Set for `==X.*` and `!=X.*`.
    pub wildcard: bool,
}

impl Specifier {
    /// Test whether `candidate` satisfies this clause.
    pub fn contains(&self, candidate: &PackageVersion) -> bool {
        if self.operator == Operator::Arbitrary {
            return candidate.to_string().eq_ignore_ascii_case(&self.version);
        }
        let Ok(spec) = self.version.parse::<PackageVersion>() else {
            return false;
        };
        match self.operator {
            Operator::Compatible => {
                let mut prefix = spec.base();
                prefix.release.pop();
                *candidate >= spec && prefix_match(&prefix, candidate)
            }
            Operator::Equal => self.equal(&spec, candidate),
            Operator::NotEqual => !self.equal(&spec, candidate),
            Operator::LessEqual => candidate.public() <= spec,
            Operator::GreaterEqual => candidate.public() >= spec,
            Operator::Less => {
                let candidate = candidate.public();
                candidate < spec
                    && !(!spec.is_prerelease()
                        && candidate.is_prerelease()
                        && candidate.base() == spec.base())
            }
            Operator::Greater => {
                candidate.public() > spec
                    && !(!spec.is_postrelease()
                        && candidate.is_postrelease()
                        && candidate.base() == spec.base())
                    && !(candidate.local.is_some() && candidate.base() == spec.base())
            }
            Operator::Arbitrary => candidate.to_string().eq_ignore_ascii_case(&self.version),
        }
    }

    /// Test a raw version string. Unparseable strings only satisfy `===`.
    pub fn contains_str(&self, candidate: &str) -> bool {
        if self.operator == Operator::Arbitrary {
            return candidate.trim().eq_ignore_ascii_case(self.version.trim());
        }
        candidate
            .parse::<PackageVersion>()
            .map(|v| self.contains(&v))
            .unwrap_or(false)
    }

    fn equal(&self, spec: &PackageVersion, candidate: &PackageVersion) -> bool {
        if self.wildcard {
            return prefix_match(spec, candidate);
        }
        if spec.local.is_some() {
            candidate == spec
        } else {
            candidate.public() == *spec
        }
    }
}

/// `==prefix.*` semantics: epoch equal and the leading release segments equal,
/// with the candidate padded by zeros.
fn prefix_match(prefix: &PackageVersion, candidate: &PackageVersion) -> bool {
    if prefix.epoch != candidate.epoch {
        return false;
    }
    prefix
        .release
        .iter()
        .enumerate()
        .all(|(i, n)| candidate.release.get(i).copied().unwrap_or(0) == *n)
}

static SPECIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(===|~=|==|!=|<=|>=|<|>)\s*([^\s,;]+)\s*$").expect("Invalid regex")
});

impl FromStr for Specifier {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = SPECIFIER_RE
            .captures(s)
            .ok_or_else(|| AppError::InvalidSpecifier(s.to_string()))?;
        let operator = match &caps[1] {
            "===" => Operator::Arbitrary,
            "~=" => Operator::Compatible,
            "==" => Operator::Equal,
            "!=" => Operator::NotEqual,
            "<=" => Operator::LessEqual,
            ">=" => Operator::GreaterEqual,
            "<" => Operator::Less,
            _ => Operator::Greater,
        };
        let raw = caps[2].to_string();
        if operator == Operator::Arbitrary {
            return Ok(Specifier {
                operator,
                version: raw,
                wildcard: false,
            });
        }

        let (version, wildcard) = match raw.strip_suffix(".*") {
            Some(prefix) => (prefix.to_string(), true),
            None => (raw.clone(), false),
        };
        let parsed = version
            .parse::<PackageVersion>()
            .map_err(|_| AppError::InvalidSpecifier(s.to_string()))?;

        let valid = match operator {
            Operator::Equal | Operator::NotEqual if wildcard => parsed.is_plain_release(),
            Operator::Compatible => parsed.release.len() >= 2 && parsed.local.is_none(),
            Operator::Equal | Operator::NotEqual => true,
            _ => parsed.local.is_none() && !wildcard,
        };
        if !valid {
            return Err(AppError::InvalidSpecifier(s.to_string()));
        }
        Ok(Specifier {
            operator,
            version,
            wildcard,
        })
    }
}

impl fmt::Display for Specifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.operator.as_str(), self.version)?;
        if self.wildcard {
            f.write_str(".*")?;
        }
        Ok(())
    }
}

// ============================================================================
// SpecifierSet
// ============================================================================

/// A conjunction of specifiers. The empty set admits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecifierSet {
    pub specifiers: Vec<Specifier>,
}

impl SpecifierSet {
    pub fn is_empty(&self) -> bool {
        self.specifiers.is_empty()
    }

    pub fn contains(&self, candidate: &PackageVersion) -> bool {
        self.specifiers.iter().all(|s| s.contains(candidate))
    }

    /// Test a raw identifier such as a tag name.
    ///
    /// The empty set admits any identifier, even one that is not a version.
    pub fn contains_str(&self, candidate: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        if self.specifiers.iter().all(|s| s.operator == Operator::Arbitrary) {
            return self.specifiers.iter().all(|s| s.contains_str(candidate));
        }
        match candidate.parse::<PackageVersion>() {
            Ok(v) => self.specifiers.iter().all(|s| match s.operator {
                Operator::Arbitrary => s.contains_str(candidate),
                _ => s.contains(&v),
            }),
            Err(_) => false,
        }
    }
}

impl FromStr for SpecifierSet {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let specifiers = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<Specifier>, _>>()
            .map_err(|_| AppError::InvalidSpecifier(s.to_string()))?;
        if specifiers.is_empty() && !s.trim().is_empty() {
            return Err(AppError::InvalidSpecifier(s.to_string()));
        }
        Ok(SpecifierSet { specifiers })
    }
}

impl fmt::Display for SpecifierSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.specifiers.iter().map(|s| s.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}

// ============================================================================
// Requirement
// ============================================================================

static REQUIREMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^\s*
        (?P<name>[A-Za-z0-9](?:[A-Za-z0-9._-]*[A-Za-z0-9])?)
        \s*
        (?:\[(?P<extras>[^\]]*)\])?
        \s*
        (?:
            @\s*(?P<url>[^\s;]+)
            |
            \(\s*(?P<paren>[^)]*)\)
            |
            (?P<bare>[<>=!~][^;]*)
        )?
        \s*
        (?:;\s*(?P<marker>.*?))?
        \s*$",
    )
    .expect("Invalid regex")
});

/// A dependency declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub extras: Vec<String>,
    pub specifier: SpecifierSet,
    pub url: Option<String>,
    /// Environment marker, kept verbatim and not evaluated.
    pub marker: Option<String>,
}

impl FromStr for Requirement {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || AppError::InvalidRequirement(s.to_string());
        let caps = REQUIREMENT_RE.captures(s).ok_or_else(invalid)?;

        let extras = caps
            .name("extras")
            .map(|m| {
                m.as_str()
                    .split(',')
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let spec_text = caps
            .name("paren")
            .or_else(|| caps.name("bare"))
            .map(|m| m.as_str())
            .unwrap_or("");
        let specifier = spec_text.parse().map_err(|_| invalid())?;

        Ok(Requirement {
            name: caps["name"].to_string(),
            extras,
            specifier,
            url: caps.name("url").map(|m| m.as_str().to_string()),
            marker: caps
                .name("marker")
                .map(|m| m.as_str().to_string())
                .filter(|m| !m.is_empty()),
        })
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.extras.is_empty() {
            write!(f, "[{}]", self.extras.join(","))?;
        }
        if let Some(url) = &self.url {
            write!(f, " @ {}", url)?;
        } else {
            write!(f, "{}", self.specifier)?;
        }
        if let Some(marker) = &self.marker {
            write!(f, "; {}", marker)?;
        }
        Ok(())
    }
}
