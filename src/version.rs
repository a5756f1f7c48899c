use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A dot-separated numeric version such as `2.10.1`.
///
/// Missing trailing components compare as `0`, so `2.1` and `2.1.0` are equal.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<u64>,
}

/// Error returned when a string is not a dotted-numeric version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionParseError {
    input: String,
}

impl fmt::Display for VersionParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a dotted-numeric version", self.input)
    }
}

impl std::error::Error for VersionParseError {}

impl Version {
    /// The numeric components, left to right, as written.
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || VersionParseError {
            input: s.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(err());
        }

        let components = trimmed
            .split('.')
            .map(|part| {
                // u64::from_str accepts a leading '+', which is not a version digit
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(err());
                }
                part.parse::<u64>().map_err(|_| err())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        (0..len)
            .map(|i| {
                let a = self.components.get(i).copied().unwrap_or(0);
                let b = other.components.get(i).copied().unwrap_or(0);
                a.cmp(&b)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

/// Returns true if `remote` is strictly newer than `local`.
pub fn is_update_available(remote: &Version, local: &Version) -> bool {
    remote > local
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_trailing_zeros_are_equal() {
        assert_eq!(v("2.1"), v("2.1.0"));
        assert_eq!(v("2"), v("2.0.0.0"));
        assert!(!is_update_available(&v("2.1"), &v("2.1.0")));
        assert!(!is_update_available(&v("2.1.0"), &v("2.1")));
    }

    #[test]
    fn test_newer_remote() {
        assert!(is_update_available(&v("2.2"), &v("2.1")));
        assert!(is_update_available(&v("2.10.1"), &v("2.9.9")));
        assert!(is_update_available(&v("2.1.0.1"), &v("2.1")));
    }

    #[test]
    fn test_older_remote() {
        assert!(!is_update_available(&v("1.9"), &v("2.0")));
        assert!(!is_update_available(&v("2.9"), &v("2.10")));
    }

    #[test]
    fn test_components_compare_numerically() {
        // "10" sorts before "9" as a string, but not as a number
        assert!(v("1.10") > v("1.9"));
        assert_eq!(v("1.01"), v("1.1"));
    }

    #[test]
    fn test_ordering_is_consistent() {
        let versions = ["0", "0.1", "1", "1.0.1", "1.2", "1.10", "2.0.0", "2.1", "10"];
        for a in versions {
            assert_eq!(v(a).cmp(&v(a)), Ordering::Equal, "{} should equal itself", a);
            for b in versions {
                assert_eq!(v(a).cmp(&v(b)), v(b).cmp(&v(a)).reverse(), "{} vs {}", a, b);
            }
        }
        let mut sorted: Vec<Version> = versions.iter().rev().map(|s| v(s)).collect();
        sorted.sort();
        let rendered: Vec<String> = sorted.iter().map(Version::to_string).collect();
        assert_eq!(rendered, ["0", "0.1", "1", "1.0.1", "1.2", "1.10", "2.0.0", "2.1", "10"]);
    }

    #[test]
    fn test_rejects_non_numeric() {
        let invalid = [
            "",
            "   ",
            "1.0b",
            "1.0-beta",
            "v1.0",
            "1..0",
            "1.0.",
            ".1",
            "+1.0",
            "1.-2",
            "99999999999999999999999",
        ];
        for input in invalid {
            let err = input.parse::<Version>().unwrap_err();
            assert!(err.to_string().contains("not a dotted-numeric version"), "{}", input);
        }
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert_eq!(v(" 1.2.3\n").components(), &[1, 2, 3]);
    }

    #[test]
    fn test_display() {
        assert_eq!(v("2.10.1").to_string(), "2.10.1");
    }
}
