//! Version gates for catalog items and opcodes.
//!
//! A constraint is a comma separated list of clauses that must all hold.
//! Each clause is an optional operator (`>=`, `<=`, `>`, `<`, `=`, `==`, `!=`)
//! followed by a dotted version, or `*` for any version:
//!
//! ```text
//! 2.204
//! >=2.200, <2.210
//! ```

use std::cmp::Ordering;

use tracing::warn;

/// Decides whether the running target satisfies a declared constraint.
pub trait VersionCheck {
    fn satisfies(&self, constraint: &str) -> bool;
}

impl<F> VersionCheck for F
where
    F: Fn(&str) -> bool,
{
    fn satisfies(&self, constraint: &str) -> bool {
        self(constraint)
    }
}

/// Accepts every constraint. Used when the target version is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyVersion;

impl VersionCheck for AnyVersion {
    fn satisfies(&self, _constraint: &str) -> bool {
        true
    }
}

/// A dotted numeric version such as `2.204` or `2.2.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameVersion {
    raw: String,
    parts: Vec<u64>,
}

impl GameVersion {
    pub fn parse(text: &str) -> Self {
        Self {
            raw: text.trim().to_string(),
            parts: parse_parts(text),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn compare(&self, other: &[u64]) -> Ordering {
        let len = self.parts.len().max(other.len());
        (0..len)
            .map(|i| {
                let lhs = self.parts.get(i).copied().unwrap_or(0);
                let rhs = other.get(i).copied().unwrap_or(0);
                lhs.cmp(&rhs)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn satisfies_clause(&self, clause: &str) -> bool {
        let clause = clause.trim();
        if clause.is_empty() || clause == "*" {
            return true;
        }

        let (op, version) = split_operator(clause);
        if version.is_empty() {
            warn!("Ignoring malformed version clause '{}'", clause);
            return false;
        }

        let ordering = self.compare(&parse_parts(version));
        match op {
            ">=" => ordering.is_ge(),
            "<=" => ordering.is_le(),
            ">" => ordering.is_gt(),
            "<" => ordering.is_lt(),
            "!=" => ordering.is_ne(),
            _ => ordering.is_eq(),
        }
    }
}

impl VersionCheck for GameVersion {
    fn satisfies(&self, constraint: &str) -> bool {
        constraint
            .split(',')
            .all(|clause| self.satisfies_clause(clause))
    }
}

fn split_operator(clause: &str) -> (&str, &str) {
    for op in [">=", "<=", "==", "!=", ">", "<", "="] {
        if let Some(rest) = clause.strip_prefix(op) {
            return (op, rest.trim());
        }
    }
    ("=", clause)
}

/// Numeric components; a component's trailing non-digits are ignored.
fn parse_parts(text: &str) -> Vec<u64> {
    text.trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_version() {
        let version = GameVersion::parse("2.204");
        assert!(version.satisfies("2.204"));
        assert!(version.satisfies("=2.204"));
        assert!(version.satisfies("2.204.0"));
        assert!(!version.satisfies("2.205"));
    }

    #[test]
    fn test_ranges() {
        let version = GameVersion::parse("2.204");
        assert!(version.satisfies(">=2.200, <2.210"));
        assert!(!version.satisfies(">2.204"));
        assert!(version.satisfies("<=2.204"));
        assert!(version.satisfies("!=2.113"));
        assert!(version.satisfies("*"));
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let version = GameVersion::parse("2.10");
        assert!(version.satisfies(">2.9"));
    }

    #[test]
    fn test_malformed_clause_fails_closed() {
        let version = GameVersion::parse("2.204");
        assert!(!version.satisfies(">="));
    }

    #[test]
    fn test_closure_and_any() {
        let only_latest = |c: &str| c == "latest";
        assert!(only_latest.satisfies("latest"));
        assert!(!only_latest.satisfies("2.113"));
        assert!(AnyVersion.satisfies("<1.0"));
    }
}
