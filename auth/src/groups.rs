//! Group-membership authorization check
//!
//! The same pure function backs two trust domains:
//! - the client, where it only decides what the UI shows (the claims were
//!   decoded without signature verification, so the answer is a hint);
//! - the server, where it runs on verified claims and gates every mutation.
//!
//! Only the server-side call has security meaning.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Name of the group-membership claim issued by the identity provider
pub const GROUPS_CLAIM: &str = "cognito:groups";

/// Set of group names allowed to mutate listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrivilegedGroups(BTreeSet<String>);

impl PrivilegedGroups {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, group: &str) -> bool {
        self.0.contains(group)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for PrivilegedGroups {
    fn default() -> Self {
        Self::new(["owners", "editors"])
    }
}

/// Returns the privileged groups the claim set is a member of.
///
/// The group claim may be an array of strings or a single comma-delimited
/// string. Any other shape, including a missing claim, yields the empty set.
pub fn extract_privileged_groups(
    claims: &Map<String, Value>,
    privileged: &PrivilegedGroups,
) -> BTreeSet<String> {
    let names: Vec<&str> = match claims.get(GROUPS_CLAIM) {
        Some(Value::Array(values)) => values.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(joined)) => joined.split(',').map(str::trim).collect(),
        _ => return BTreeSet::new(),
    };

    names
        .into_iter()
        .filter(|name| privileged.contains(name))
        .map(String::from)
        .collect()
}

/// Fail-closed membership test on top of [`extract_privileged_groups`].
pub fn is_privileged(claims: &Map<String, Value>, privileged: &PrivilegedGroups) -> bool {
    !extract_privileged_groups(claims, privileged).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_non_string_array_entries_are_ignored() {
        let c = claims(json!({"cognito:groups": [1, null, "editors", {"name": "owners"}]}));
        let groups = extract_privileged_groups(&c, &PrivilegedGroups::default());
        assert_eq!(groups.into_iter().collect::<Vec<_>>(), vec!["editors"]);
    }

    #[test]
    fn test_empty_privileged_set_denies_everyone() {
        let c = claims(json!({"cognito:groups": ["owners"]}));
        let none = PrivilegedGroups::new(Vec::<String>::new());
        assert!(none.is_empty());
        assert!(!is_privileged(&c, &none));
    }
}
