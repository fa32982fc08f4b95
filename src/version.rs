//! Version parsing and constraint resolution.
//!
//! Box versions are dot-separated sequences of numeric and label segments.
//! Constraints are comma-separated lists of `<op> <version>` items that must
//! all hold, where `op` is one of `=`, `!=`, `>`, `>=`, `<`, `<=` or the
//! pessimistic `~>`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::error::{BoxError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Numeric(u64),
    Label(String),
}

impl Ord for Segment {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Segment::Numeric(a), Segment::Numeric(b)) => a.cmp(b),
            (Segment::Label(a), Segment::Label(b)) => a.cmp(b),
            // Labels mark pre-releases, which come before the release itself.
            (Segment::Label(_), Segment::Numeric(_)) => Ordering::Less,
            (Segment::Numeric(_), Segment::Label(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Segment {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed box version.
///
/// The original text is kept because it names the version directory on
/// disk; comparison only looks at the parsed segments.
#[derive(Debug, Clone)]
pub struct Version {
    original: String,
    segments: Vec<Segment>,
}

impl Version {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || BoxError::InvalidVersion {
            version: input.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for (index, part) in trimmed.split('.').enumerate() {
            if part.is_empty()
                || !part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(invalid());
            }

            if part.bytes().all(|b| b.is_ascii_digit()) {
                let n = part.parse::<u64>().map_err(|_| invalid())?;
                segments.push(Segment::Numeric(n));
            } else if index == 0 {
                return Err(invalid());
            } else {
                segments.push(Segment::Label(part.to_string()));
            }
        }

        Ok(Self {
            original: trimmed.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Upper bound used by `~>`: trailing labels are dropped, then the last
    /// segment is dropped (when more than one remains) and the new last
    /// segment is incremented. `1.2.3` bumps to `1.3`, `1.2` to `2`.
    fn bump(&self) -> Version {
        let mut numbers: Vec<u64> = self
            .segments
            .iter()
            .map_while(|s| match s {
                Segment::Numeric(n) => Some(*n),
                Segment::Label(_) => None,
            })
            .collect();

        if numbers.len() > 1 {
            numbers.pop();
        }
        if let Some(last) = numbers.last_mut() {
            *last = last.saturating_add(1);
        }

        Version {
            original: numbers
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join("."),
            segments: numbers.into_iter().map(Segment::Numeric).collect(),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments.hash(state);
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        // Lexicographic Vec ordering: a strict prefix sorts first.
        self.segments.cmp(&other.segments)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

impl FromStr for Version {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Pessimistic,
}

impl Operator {
    // Longest tokens first so ">=" is not read as ">".
    const TOKENS: [(&'static str, Operator); 7] = [
        ("~>", Operator::Pessimistic),
        (">=", Operator::Ge),
        ("<=", Operator::Le),
        ("!=", Operator::Ne),
        ("=", Operator::Eq),
        (">", Operator::Gt),
        ("<", Operator::Lt),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Pessimistic => "~>",
        }
    }
}

/// A single `<op> <version>` constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub op: Operator,
    pub version: Version,
}

impl Requirement {
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || BoxError::InvalidVersionConstraint {
            constraint: input.to_string(),
        };

        let trimmed = input.trim();
        let (op, rest) = Operator::TOKENS
            .iter()
            .find_map(|(token, op)| trimmed.strip_prefix(token).map(|rest| (*op, rest)))
            .unwrap_or((Operator::Eq, trimmed));

        let version = Version::parse(rest).map_err(|_| invalid())?;
        Ok(Self { op, version })
    }

    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        match self.op {
            Operator::Eq => candidate == &self.version,
            Operator::Ne => candidate != &self.version,
            Operator::Gt => candidate > &self.version,
            Operator::Ge => candidate >= &self.version,
            Operator::Lt => candidate < &self.version,
            Operator::Le => candidate <= &self.version,
            Operator::Pessimistic => {
                candidate >= &self.version && candidate < &self.version.bump()
            }
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.as_str(), self.version)
    }
}

/// A comma-separated list of requirements, all of which must hold.
///
/// The empty list accepts every version.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRequirement {
    requirements: Vec<Requirement>,
}

impl VersionRequirement {
    pub fn parse(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }

        let requirements = input
            .split(',')
            .map(|item| {
                if item.trim().is_empty() {
                    Err(BoxError::InvalidVersionConstraint {
                        constraint: input.to_string(),
                    })
                } else {
                    Requirement::parse(item)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { requirements })
    }

    /// Requirement matching exactly one version.
    pub fn exact(version: &Version) -> Self {
        Self {
            requirements: vec![Requirement {
                op: Operator::Eq,
                version: version.clone(),
            }],
        }
    }

    pub fn is_any(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn satisfied_by(&self, candidate: &Version) -> bool {
        self.requirements.iter().all(|r| r.satisfied_by(candidate))
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(", "))
    }
}

impl FromStr for VersionRequirement {
    type Err = BoxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Version resolver - pure functions over candidate versions.
pub struct VersionResolver;

impl VersionResolver {
    /// Sort versions latest first.
    pub fn sort_descending(versions: &mut [Version]) {
        versions.sort_by(|a, b| b.cmp(a));
    }

    /// Candidates satisfying `requirement`, latest first.
    pub fn matching(versions: Vec<Version>, requirement: &VersionRequirement) -> Vec<Version> {
        let mut matched: Vec<Version> = versions
            .into_iter()
            .filter(|v| requirement.satisfied_by(v))
            .collect();
        Self::sort_descending(&mut matched);
        matched
    }
}
