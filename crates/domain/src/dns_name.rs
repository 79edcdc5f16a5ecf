use crate::errors::DomainError;
use hickory_proto::rr::domain::Label;
use hickory_proto::rr::Name;
use std::fmt;
use std::str::FromStr;

/// An absolute domain name.
///
/// Wraps [`hickory_proto::rr::Name`], always fully qualified. Labels keep the
/// case they arrived with; comparison and hashing are ASCII
/// case-insensitive.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DomainName(Name);

fn invalid(e: impl fmt::Display) -> DomainError {
    DomainError::InvalidDomainName(e.to_string())
}

impl DomainName {
    pub fn root() -> Self {
        Self(Name::root())
    }

    pub fn from_labels<I, L>(labels: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[u8]>,
    {
        let mut parsed = Vec::new();
        for label in labels {
            let label = label.as_ref();
            if label.is_empty() {
                return Err(DomainError::InvalidDomainName("empty label".into()));
            }
            parsed.push(Label::from_raw_bytes(label).map_err(invalid)?);
        }
        let mut name = Name::from_labels(parsed).map_err(invalid)?;
        name.set_fqdn(true);
        Ok(Self(name))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_root()
    }

    /// Number of labels, wildcard included.
    pub fn label_count(&self) -> usize {
        self.0.iter().len()
    }

    /// Labels leftmost first; `.rev()` walks root-first.
    pub fn labels(&self) -> impl DoubleEndedIterator<Item = &[u8]> + ExactSizeIterator + '_ {
        self.0.iter()
    }

    pub fn first_label(&self) -> Option<&[u8]> {
        self.0.iter().next()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self(self.0.base_name()))
    }

    /// The name made of the `count` rightmost labels.
    pub fn suffix(&self, count: usize) -> Self {
        Self(self.0.trim_to(count))
    }

    pub fn prepend_label(&self, label: &[u8]) -> Result<Self, DomainError> {
        Self::from_labels(std::iter::once(label).chain(self.labels()))
    }

    /// True when `self` equals `other` or lies below it.
    pub fn is_subdomain_of(&self, other: &Self) -> bool {
        other.0.zone_of(&self.0)
    }

    pub fn to_lowercase(&self) -> Self {
        Self(self.0.to_lowercase())
    }

    pub fn as_hickory(&self) -> &Name {
        &self.0
    }

    pub fn into_hickory(self) -> Name {
        self.0
    }
}

impl Default for DomainName {
    fn default() -> Self {
        Self::root()
    }
}

impl From<Name> for DomainName {
    fn from(mut name: Name) -> Self {
        name.set_fqdn(true);
        Self(name)
    }
}

impl From<DomainName> for Name {
    fn from(name: DomainName) -> Self {
        name.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return f.write_str(".");
        }
        f.write_str(&self.0.to_ascii())
    }
}

impl fmt::Debug for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DomainName({})", self)
    }
}

impl FromStr for DomainName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DomainError::InvalidDomainName("empty name".into()));
        }
        if s == "." {
            return Ok(Self::root());
        }
        if has_empty_label(s) {
            return Err(DomainError::InvalidDomainName(format!("empty label in '{}'", s)));
        }
        let mut name = Name::from_ascii(s).map_err(|e| invalid(format!("'{}': {}", s, e)))?;
        name.set_fqdn(true);
        Ok(Self(name))
    }
}

/// A leading dot or two unescaped dots in a row.
fn has_empty_label(s: &str) -> bool {
    let mut previous_dot = true;
    let mut escaped = false;
    for b in s.bytes() {
        if escaped {
            escaped = false;
            previous_dot = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'.' if previous_dot => return true,
            b'.' => {
                previous_dot = true;
                continue;
            }
            _ => {}
        }
        previous_dot = false;
    }
    false
}
