//! Compatibility of app versions with the installed environment.
//!
//! An app's `requires` map is keyed by version specifiers (`>=1.0`) or, when
//! a key does not parse as one, by a regular expression matched at the start
//! of the version identifier. Every key matching a version contributes its
//! requirement list; the version is compatible iff at least one key matches
//! and every contributed requirement is fulfilled by an installed package.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;

use crate::errors::AppError;
use crate::packages::Package;
use crate::specifier::{Requirement, SpecifierSet};
use crate::version::AppVersion;

/// How a `requires` key selects versions.
#[derive(Debug, Clone)]
pub enum VersionMatcher {
    Specifiers(SpecifierSet),
    /// Non-standard key, matched like `re.match` (anchored at the start only).
    Pattern(Regex),
}

impl VersionMatcher {
    pub fn parse(key: &str) -> Result<Self, AppError> {
        if let Ok(set) = key.parse::<SpecifierSet>() {
            return Ok(VersionMatcher::Specifiers(set));
        }
        Regex::new(&format!("^(?:{})", key))
            .map(VersionMatcher::Pattern)
            .map_err(|_| AppError::InvalidSpecifier(key.to_string()))
    }

    pub fn matches(&self, identifier: &str) -> bool {
        match self {
            VersionMatcher::Specifiers(set) => set.contains_str(identifier),
            VersionMatcher::Pattern(re) => re.is_match(identifier),
        }
    }
}

#[derive(Debug, Clone)]
struct RequirementEntry {
    raw: String,
    /// `None` if the string is not a valid requirement; such an entry is
    /// never fulfilled.
    parsed: Option<Requirement>,
}

impl RequirementEntry {
    fn fulfilled_by(&self, packages: &[Package]) -> bool {
        match &self.parsed {
            Some(req) => packages.iter().any(|p| p.fulfills(req)),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
struct CompatibilityRule {
    matcher: VersionMatcher,
    requirements: Vec<RequirementEntry>,
}

/// Parsed `requires` map of one app.
#[derive(Debug, Clone)]
pub struct CompatibilityMap {
    rules: Vec<CompatibilityRule>,
}

impl Default for CompatibilityMap {
    /// `{"": []}`: every version matches and nothing is required.
    fn default() -> Self {
        Self {
            rules: vec![CompatibilityRule {
                matcher: VersionMatcher::Specifiers(SpecifierSet::default()),
                requirements: Vec::new(),
            }],
        }
    }
}

impl CompatibilityMap {
    /// Build from registry metadata. A missing map means "no requirements".
    ///
    /// Keys that are neither specifiers nor valid patterns are skipped with a warning.
    pub fn from_requires(requires: Option<&BTreeMap<String, Vec<String>>>) -> Self {
        let Some(requires) = requires else {
            return Self::default();
        };
        let rules = requires
            .iter()
            .filter_map(|(key, reqs)| match VersionMatcher::parse(key) {
                Ok(matcher) => Some(CompatibilityRule {
                    matcher,
                    requirements: reqs
                        .iter()
                        .map(|raw| RequirementEntry {
                            raw: raw.clone(),
                            parsed: raw
                                .parse::<Requirement>()
                                .map_err(|e| tracing::warn!("{}", e))
                                .ok(),
                        })
                        .collect(),
                }),
                Err(e) => {
                    tracing::warn!("Ignoring requires key: {}", e);
                    None
                }
            })
            .collect();
        Self { rules }
    }

    fn matching<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a CompatibilityRule> {
        self.rules.iter().filter(move |r| r.matcher.matches(identifier))
    }

    /// `None` for sentinel versions, otherwise whether `version` can run
    /// against `packages`.
    pub fn is_compatible(&self, version: &AppVersion, packages: &[Package]) -> Option<bool> {
        let identifier = version.identifier()?;
        let mut any_match = false;
        for rule in self.matching(&identifier) {
            any_match = true;
            if !rule.requirements.iter().all(|r| r.fulfilled_by(packages)) {
                return Some(false);
            }
        }
        Some(any_match)
    }

    /// Requirement strings of `version` that no installed package fulfills.
    pub fn missing_requirements(&self, version: &AppVersion, packages: &[Package]) -> Vec<String> {
        let Some(identifier) = version.identifier() else {
            return Vec::new();
        };
        let mut seen = HashSet::new();
        self.matching(&identifier)
            .flat_map(|rule| rule.requirements.iter())
            .filter(|r| !r.fulfilled_by(packages))
            .map(|r| r.raw.as_str())
            .filter(|raw| seen.insert(*raw))
            .map(str::to_string)
            .collect()
    }
}
