use hearth_auth::groups::{PrivilegedGroups, extract_privileged_groups, is_privileged};
use serde_json::{Map, Value, json};

fn claims(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("claims must be an object")
}

#[test]
fn test_array_membership() {
    let privileged = PrivilegedGroups::default();
    assert!(is_privileged(
        &claims(json!({"cognito:groups": ["owners"]})),
        &privileged
    ));
    assert!(!is_privileged(
        &claims(json!({"cognito:groups": ["readonly"]})),
        &privileged
    ));
}

#[test]
fn test_comma_delimited_membership() {
    let privileged = PrivilegedGroups::default();
    assert!(is_privileged(
        &claims(json!({"cognito:groups": "editors,readonly"})),
        &privileged
    ));
    assert!(is_privileged(
        &claims(json!({"cognito:groups": "readonly, owners"})),
        &privileged
    ));
    assert!(!is_privileged(
        &claims(json!({"cognito:groups": "readonly"})),
        &privileged
    ));
}

#[test]
fn test_fails_closed_on_unexpected_shapes() {
    let privileged = PrivilegedGroups::default();
    assert!(!is_privileged(&claims(json!({})), &privileged));
    assert!(!is_privileged(
        &claims(json!({"cognito:groups": 42})),
        &privileged
    ));
    assert!(!is_privileged(
        &claims(json!({"cognito:groups": null})),
        &privileged
    ));
    assert!(!is_privileged(
        &claims(json!({"cognito:groups": {"owners": true}})),
        &privileged
    ));
    // near misses are not members
    assert!(!is_privileged(
        &claims(json!({"cognito:groups": ["Owners", "editor"]})),
        &privileged
    ));
}

#[test]
fn test_extract_returns_only_privileged_names() {
    let privileged = PrivilegedGroups::default();
    let groups = extract_privileged_groups(
        &claims(json!({"cognito:groups": ["readonly", "editors", "owners"]})),
        &privileged,
    );
    assert_eq!(
        groups.into_iter().collect::<Vec<_>>(),
        vec!["editors".to_string(), "owners".to_string()]
    );
}

#[test]
fn test_custom_privileged_groups() {
    let privileged = PrivilegedGroups::new(["admins"]);
    let c = claims(json!({"cognito:groups": ["owners", "admins"]}));
    let groups = extract_privileged_groups(&c, &privileged);
    assert_eq!(groups.len(), 1);
    assert!(groups.contains("admins"));
}

#[test]
fn test_privileged_groups_config_parsing() {
    let privileged: PrivilegedGroups =
        serde_json::from_str(r#"["owners", "managers"]"#).expect("parse groups");
    assert!(privileged.contains("managers"));
    assert!(!privileged.contains("editors"));
}
