//! Dotted version numbers.

use std::fmt;
use std::str::FromStr;

/// One component of a version. Numbers sort before text.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Part {
    Num(u64),
    Text(String),
}

/// A dotted version such as `15.0` or `16.0.1.2`, compared component-wise.
///
/// A version that is a prefix of another sorts first (`15` < `15.0`).
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Vec<Part>);

impl Version {
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Self::default();
        }
        Self(
            s.split('.')
                .map(|part| match part.parse() {
                    Ok(n) if part.bytes().all(|b| b.is_ascii_digit()) => Part::Num(n),
                    _ => Part::Text(part.to_string()),
                })
                .collect(),
        )
    }

    pub fn from_parts(parts: &[u64]) -> Self {
        Self(parts.iter().copied().map(Part::Num).collect())
    }

    /// Leading numeric component.
    pub fn major(&self) -> Option<u64> {
        match self.0.first() {
            Some(Part::Num(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match part {
                Part::Num(n) => write!(f, "{n}")?,
                Part::Text(t) => f.write_str(t)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let v = Version::parse("16.0.1a");
        assert_eq!(v.major(), Some(16));
        assert_eq!(v.to_string(), "16.0.1a");
        assert!(Version::parse("").is_empty());
    }

    #[test]
    fn test_ordering() {
        assert!(Version::parse("9.0") < Version::parse("10.0"));
        assert!(Version::parse("13") < Version::parse("13.0"));
        assert!(Version::parse("13.0") <= Version::from_parts(&[13, 0]));
        assert!(Version::parse("14.0") > Version::from_parts(&[13, 0]));
        assert!(Version::parse("1.2") < Version::parse("1.x"));
    }
}
