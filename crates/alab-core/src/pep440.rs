//! PEP 440 package versions.
//!
//! Parses the public and local version scheme used by Python packaging and
//! orders versions the way installers do (`1.0.dev0 < 1.0a1 < 1.0 < 1.0.post1`).
//! A leading `v` is accepted so git tags like `v1.2.0` compare as versions.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::AppError;

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*v?
        (?:(?P<epoch>[0-9]+)!)?
        (?P<release>[0-9]+(?:\.[0-9]+)*)
        (?P<pre>
            [-_.]?
            (?P<pre_l>alpha|a|beta|b|preview|pre|c|rc)
            [-_.]?
            (?P<pre_n>[0-9]+)?
        )?
        (?P<post>
            (?:-(?P<post_n1>[0-9]+))
            |
            (?:[-_.]?(?P<post_l>post|rev|r)[-_.]?(?P<post_n2>[0-9]+)?)
        )?
        (?P<dev>[-_.]?dev[-_.]?(?P<dev_n>[0-9]+)?)?
        (?:\+(?P<local>[a-z0-9]+(?:[-_.][a-z0-9]+)*))?
        \s*$",
    )
    .expect("Invalid regex")
});

/// Pre-release phase, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PreKind {
    Alpha,
    Beta,
    Rc,
}

impl PreKind {
    fn parse(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "a" | "alpha" => PreKind::Alpha,
            "b" | "beta" => PreKind::Beta,
            _ => PreKind::Rc,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            PreKind::Alpha => "a",
            PreKind::Beta => "b",
            PreKind::Rc => "rc",
        }
    }
}

/// One dot-separated component of a local version label.
///
/// Numeric components sort after alphanumeric ones.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocalSegment {
    Str(String),
    Num(u64),
}

impl fmt::Display for LocalSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocalSegment::Str(s) => f.write_str(s),
            LocalSegment::Num(n) => write!(f, "{}", n),
        }
    }
}

/// A parsed PEP 440 version.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub pre: Option<(PreKind, u64)>,
    pub post: Option<u64>,
    pub dev: Option<u64>,
    pub local: Option<Vec<LocalSegment>>,
}

/// Sort key wrapper placing `Low` before and `High` after every value.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Bound<T> {
    Low,
    Val(T),
    High,
}

type SortKey<'a> = (
    u64,
    &'a [u64],
    Bound<(PreKind, u64)>,
    Bound<u64>,
    Bound<u64>,
    Bound<&'a [LocalSegment]>,
);

impl PackageVersion {
    /// Release with trailing zeros dropped, so `1.0` and `1.0.0` compare equal.
    fn trimmed_release(&self) -> &[u64] {
        let end = self
            .release
            .iter()
            .rposition(|&n| n != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.release[..end]
    }

    fn sort_key(&self) -> SortKey<'_> {
        let pre = match (self.pre, self.post, self.dev) {
            (None, None, Some(_)) => Bound::Low,
            (None, _, _) => Bound::High,
            (Some(p), _, _) => Bound::Val(p),
        };
        let post = self.post.map_or(Bound::Low, Bound::Val);
        let dev = self.dev.map_or(Bound::High, Bound::Val);
        let local = self
            .local
            .as_deref()
            .map_or(Bound::Low, Bound::Val);
        (self.epoch, self.trimmed_release(), pre, post, dev, local)
    }

    /// True for alpha/beta/rc and dev releases.
    pub fn is_prerelease(&self) -> bool {
        self.pre.is_some() || self.dev.is_some()
    }

    pub fn is_postrelease(&self) -> bool {
        self.post.is_some()
    }

    /// The version without its local label.
    pub fn public(&self) -> PackageVersion {
        PackageVersion {
            local: None,
            ..self.clone()
        }
    }

    /// Epoch and release only.
    pub fn base(&self) -> PackageVersion {
        PackageVersion {
            epoch: self.epoch,
            release: self.release.clone(),
            pre: None,
            post: None,
            dev: None,
            local: None,
        }
    }

    /// True if nothing but epoch and release segments are set.
    pub fn is_plain_release(&self) -> bool {
        self.pre.is_none() && self.post.is_none() && self.dev.is_none() && self.local.is_none()
    }
}

impl FromStr for PackageVersion {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = VERSION_RE
            .captures(s)
            .ok_or_else(|| AppError::InvalidPackageVersion(s.to_string()))?;
        let num = |name: &str| -> Result<Option<u64>, AppError> {
            caps.name(name)
                .map(|m| {
                    m.as_str()
                        .parse::<u64>()
                        .map_err(|_| AppError::InvalidPackageVersion(s.to_string()))
                })
                .transpose()
        };

        let epoch = num("epoch")?.unwrap_or(0);
        let release = caps["release"]
            .split('.')
            .map(|n| n.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| AppError::InvalidPackageVersion(s.to_string()))?;
        let pre = match caps.name("pre_l") {
            Some(label) => Some((PreKind::parse(label.as_str()), num("pre_n")?.unwrap_or(0))),
            None => None,
        };
        let post = if caps.name("post").is_some() {
            Some(num("post_n1")?.or(num("post_n2")?).unwrap_or(0))
        } else {
            None
        };
        let dev = if caps.name("dev").is_some() {
            Some(num("dev_n")?.unwrap_or(0))
        } else {
            None
        };
        let local = caps.name("local").map(|m| {
            m.as_str()
                .split(['-', '_', '.'])
                .map(|part| match part.parse::<u64>() {
                    Ok(n) => LocalSegment::Num(n),
                    Err(_) => LocalSegment::Str(part.to_ascii_lowercase()),
                })
                .collect()
        });

        Ok(PackageVersion {
            epoch,
            release,
            pre,
            post,
            dev,
            local,
        })
    }
}

impl fmt::Display for PackageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.epoch != 0 {
            write!(f, "{}!", self.epoch)?;
        }
        let release: Vec<String> = self.release.iter().map(|n| n.to_string()).collect();
        f.write_str(&release.join("."))?;
        if let Some((kind, n)) = self.pre {
            write!(f, "{}{}", kind.as_str(), n)?;
        }
        if let Some(n) = self.post {
            write!(f, ".post{}", n)?;
        }
        if let Some(n) = self.dev {
            write!(f, ".dev{}", n)?;
        }
        if let Some(local) = &self.local {
            let parts: Vec<String> = local.iter().map(|s| s.to_string()).collect();
            write!(f, "+{}", parts.join("."))?;
        }
        Ok(())
    }
}

impl PartialEq for PackageVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PackageVersion {}

impl PartialOrd for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}
