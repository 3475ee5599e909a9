//! Structural diff between two snapshot payloads.
//!
//! Each entity family is keyed, then compared by set difference; rows with
//! the same key but different canonical serialization count as modified.
//! Canonical form is serde_json's object serialization, whose keys are
//! already sorted.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Serialize)]
pub struct ModifiedEntry {
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FamilyDiff {
    pub added: Vec<Value>,
    pub removed: Vec<Value>,
    pub modified: Vec<ModifiedEntry>,
    pub added_count: usize,
    pub removed_count: usize,
    pub modified_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDiff {
    pub users: FamilyDiff,
    pub roles: FamilyDiff,
    pub role_grants: FamilyDiff,
    pub grants: FamilyDiff,
}

/// Compare two raw snapshot payloads.
pub fn compute_diff(old_raw: &Map<String, Value>, new_raw: &Map<String, Value>) -> SnapshotDiff {
    SnapshotDiff {
        users: diff_by_key(family(old_raw, "users"), family(new_raw, "users"), name_key),
        roles: diff_by_key(family(old_raw, "roles"), family(new_raw, "roles"), name_key),
        role_grants: diff_by_key(
            family(old_raw, "role_grants"),
            family(new_raw, "role_grants"),
            role_grant_key,
        ),
        grants: diff_by_key(family(old_raw, "grants"), family(new_raw, "grants"), grant_key),
    }
}

fn family<'a>(raw: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    raw.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn diff_by_key(old_items: &[Value], new_items: &[Value], key_fn: fn(&Value) -> String) -> FamilyDiff {
    let keyed = |items: &[Value]| -> (Vec<String>, std::collections::HashMap<String, Value>) {
        let mut order = Vec::new();
        let mut map = std::collections::HashMap::new();
        for item in items {
            let key = key_fn(item);
            if !map.contains_key(&key) {
                order.push(key.clone());
            }
            map.insert(key, item.clone());
        }
        (order, map)
    };

    let (old_order, old_map) = keyed(old_items);
    let (new_order, new_map) = keyed(new_items);

    let added: Vec<Value> = new_order
        .iter()
        .filter(|k| !old_map.contains_key(*k))
        .map(|k| new_map[k].clone())
        .collect();
    let removed: Vec<Value> = old_order
        .iter()
        .filter(|k| !new_map.contains_key(*k))
        .map(|k| old_map[k].clone())
        .collect();

    let modified: Vec<ModifiedEntry> = old_order
        .iter()
        .filter_map(|k| {
            let new_item = new_map.get(k)?;
            let old_item = &old_map[k];
            (canonical(old_item) != canonical(new_item)).then(|| ModifiedEntry {
                old: old_item.clone(),
                new: new_item.clone(),
            })
        })
        .collect();

    FamilyDiff {
        added_count: added.len(),
        removed_count: removed.len(),
        modified_count: modified.len(),
        added,
        removed,
        modified,
    }
}

fn name_key(item: &Value) -> String {
    item.get("name").and_then(Value::as_str).unwrap_or("").to_string()
}

fn role_grant_key(item: &Value) -> String {
    format!(
        "{}|{}|{}",
        item.get("user_name").and_then(Value::as_str).unwrap_or(""),
        item.get("role_name").and_then(Value::as_str).unwrap_or(""),
        item.get("granted_role_name").and_then(Value::as_str).unwrap_or(""),
    )
}

fn grant_key(item: &Value) -> String {
    format!(
        "{}|{}|{}|{}|{}|{}",
        item.get("user_name").and_then(Value::as_str).unwrap_or(""),
        item.get("role_name").and_then(Value::as_str).unwrap_or(""),
        item.get("access_type").and_then(Value::as_str).unwrap_or(""),
        item.get("database").and_then(Value::as_str).unwrap_or(""),
        item.get("table").and_then(Value::as_str).unwrap_or(""),
        item.get("column").and_then(Value::as_str).unwrap_or(""),
    )
}

/// Stable serialization for modification detection; serde_json objects
/// serialize with sorted keys.
fn canonical(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_added_and_removed_users_with_grant() {
        let old = raw(json!({
            "users": [{"name": "alice"}],
            "roles": [],
            "role_grants": [],
            "grants": []
        }));
        let new = raw(json!({
            "users": [{"name": "alice"}, {"name": "bob"}],
            "roles": [],
            "role_grants": [],
            "grants": [{"user_name": "alice", "access_type": "SELECT",
                        "database": "db", "table": "t"}]
        }));

        let diff = compute_diff(&old, &new);
        assert_eq!(diff.users.added_count, 1);
        assert_eq!(diff.users.added[0]["name"], "bob");
        assert!(diff.users.removed.is_empty());
        assert_eq!(diff.grants.added_count, 1);
        assert_eq!(diff.roles.added_count, 0);
    }

    #[test]
    fn test_modified_same_key_different_content() {
        let old = raw(json!({"users": [{"name": "alice", "auth_type": "plaintext_password"}]}));
        let new = raw(json!({"users": [{"name": "alice", "auth_type": "sha256_password"}]}));

        let diff = compute_diff(&old, &new);
        assert_eq!(diff.users.modified_count, 1);
        assert_eq!(diff.users.added_count, 0);
        assert_eq!(diff.users.removed_count, 0);
        assert_eq!(diff.users.modified[0].old["auth_type"], "plaintext_password");
        assert_eq!(diff.users.modified[0].new["auth_type"], "sha256_password");
    }

    #[test]
    fn test_key_field_order_does_not_matter() {
        // Same logical row, keys supplied in different order.
        let old = raw(json!({"grants": [{"user_name": "u", "access_type": "SELECT",
                                          "database": "db", "table": "", "column": ""}]}));
        let new = raw(json!({"grants": [{"database": "db", "table": "", "column": "",
                                          "access_type": "SELECT", "user_name": "u"}]}));
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.grants.modified_count, 0);
        assert_eq!(diff.grants.added_count, 0);
        assert_eq!(diff.grants.removed_count, 0);
    }

    #[test]
    fn test_role_grant_compound_key() {
        let old = raw(json!({"role_grants": [
            {"user_name": "u", "role_name": "", "granted_role_name": "a"}
        ]}));
        let new = raw(json!({"role_grants": [
            {"user_name": "u", "role_name": "", "granted_role_name": "b"}
        ]}));
        let diff = compute_diff(&old, &new);
        assert_eq!(diff.role_grants.added_count, 1);
        assert_eq!(diff.role_grants.removed_count, 1);
    }
}
