//! Relations between two names, as used by rule checkers.

use std::fmt;

use crate::name::Name;

/// How one name must relate to another for a check to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRelation {
    Equal,
    IsPrefixOf,
    /// Prefix of, and shorter than, the other name.
    IsStrictPrefixOf,
}

impl NameRelation {
    /// Evaluates the relation with `first` on the left-hand side.
    pub fn check(self, first: &Name, second: &Name) -> bool {
        match self {
            Self::Equal => first == second,
            Self::IsPrefixOf => first.is_prefix_of(second),
            Self::IsStrictPrefixOf => {
                first.is_prefix_of(second) && first.len() < second.len()
            }
        }
    }

    /// Parses the configuration keyword, case-insensitively.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "equal" => Some(Self::Equal),
            "is-prefix-of" => Some(Self::IsPrefixOf),
            "is-strict-prefix-of" => Some(Self::IsStrictPrefixOf),
            _ => None,
        }
    }
}

impl fmt::Display for NameRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Self::Equal => "equal",
            Self::IsPrefixOf => "is-prefix-of",
            Self::IsStrictPrefixOf => "is-strict-prefix-of",
        };
        f.write_str(keyword)
    }
}
