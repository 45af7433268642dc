//! Alignment rules for entry data.

use glob::Pattern;

use crate::{Error, Result};

/// Alignment of entries no rule matches.
pub const NO_ALIGNMENT: u32 = 1;

/// Required alignment for entries whose name matches a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentRule {
    pattern: Pattern,
    alignment: u32,
    all_files: bool,
}

impl AlignmentRule {
    /// A rule for stored entries matching `pattern`.
    ///
    /// `alignment` must be a power of two.
    pub fn new(pattern: &str, alignment: u32) -> Result<Self> {
        if !alignment.is_power_of_two() {
            return Err(Error::InvalidAlignment(alignment));
        }
        Ok(Self {
            pattern: Pattern::new(pattern)?,
            alignment,
            all_files: false,
        })
    }

    /// Apply the rule to compressed entries as well.
    pub fn for_all_files(mut self) -> Self {
        self.all_files = true;
        self
    }

    #[inline]
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    #[inline]
    pub fn alignment(&self) -> u32 {
        self.alignment
    }

    #[inline]
    pub fn applies_to_all_files(&self) -> bool {
        self.all_files
    }

    fn matches(&self, name: &str, compressed: bool) -> bool {
        (!compressed || self.all_files) && self.pattern.matches(name)
    }
}

/// Ordered rule table; the first matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentRules {
    rules: Vec<AlignmentRule>,
}

impl AlignmentRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule, checked after all existing ones.
    pub fn push(&mut self, rule: AlignmentRule) {
        self.rules.push(rule);
    }

    /// Append a rule.
    pub fn with_rule(mut self, rule: AlignmentRule) -> Self {
        self.push(rule);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignmentRule> {
        self.rules.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Alignment required for the data of entry `name`.
    pub fn alignment(&self, name: &str, compressed: bool) -> u32 {
        self.rules
            .iter()
            .find(|rule| rule.matches(name, compressed))
            .map_or(NO_ALIGNMENT, |rule| rule.alignment)
    }
}

impl FromIterator<AlignmentRule> for AlignmentRules {
    fn from_iter<I: IntoIterator<Item = AlignmentRule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let rules = AlignmentRules::new()
            .with_rule(AlignmentRule::new("*.so", 4096).unwrap())
            .with_rule(AlignmentRule::new("*", 4).unwrap());

        assert_eq!(rules.alignment("lib/x86/libfoo.so", false), 4096);
        assert_eq!(rules.alignment("res/raw/a.bin", false), 4);
        assert_eq!(AlignmentRules::new().alignment("a", false), NO_ALIGNMENT);
    }

    #[test]
    fn test_compressed_entries_unaligned_unless_all_files() {
        let stored_only: AlignmentRules = [AlignmentRule::new("*.txt", 64).unwrap()]
            .into_iter()
            .collect();
        assert_eq!(stored_only.alignment("a.txt", true), NO_ALIGNMENT);
        assert_eq!(stored_only.alignment("a.txt", false), 64);

        let everything = AlignmentRules::new()
            .with_rule(AlignmentRule::new("*.txt", 64).unwrap().for_all_files());
        assert_eq!(everything.alignment("a.txt", true), 64);
    }

    #[test]
    fn test_invalid_rules() {
        assert!(matches!(
            AlignmentRule::new("*.so", 3),
            Err(Error::InvalidAlignment(3))
        ));
        assert!(matches!(
            AlignmentRule::new("*.so", 0),
            Err(Error::InvalidAlignment(0))
        ));
        assert!(matches!(
            AlignmentRule::new("[", 4),
            Err(Error::InvalidPattern(_))
        ));
    }
}
