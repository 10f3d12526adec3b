//! Key predicates for subscriptions.

use std::collections::BTreeSet;

/// Decides which property keys a subscription receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PropertySelector {
    /// Every key.
    Any,
    /// Only keys in a fixed, case-sensitive set.
    Exact(BTreeSet<String>),
}

impl PropertySelector {
    /// Select exactly the given keys.
    pub fn exact<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PropertySelector::Exact(keys.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, key: &str) -> bool {
        match self {
            PropertySelector::Any => true,
            PropertySelector::Exact(keys) => keys.contains(key),
        }
    }
}

impl Default for PropertySelector {
    fn default() -> Self {
        PropertySelector::Any
    }
}
