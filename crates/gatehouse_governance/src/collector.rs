//! RBAC snapshot collection.
//!
//! Pulls the cluster's RBAC system tables, stores the raw rows as one
//! canonical JSON payload on the run, and inserts normalized entity rows.
//! Individual query failures degrade to an empty family (a partial snapshot
//! is better than none); anything worse fails the run with its error.

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::clickhouse::ClickHouseClient;
use crate::db::models::SnapshotRun;
use crate::db::SnapshotStore;
use gatehouse_db::DbError;

/// The seven read-only system-table queries, keyed by payload family.
const QUERIES: &[(&str, &str)] = &[
    ("users", "SELECT * FROM system.users"),
    ("roles", "SELECT * FROM system.roles"),
    ("role_grants", "SELECT * FROM system.role_grants"),
    ("grants", "SELECT * FROM system.grants"),
    ("settings_profiles", "SELECT * FROM system.settings_profiles"),
    ("settings_elements", "SELECT * FROM system.settings_profile_elements"),
    ("quotas", "SELECT * FROM system.quotas"),
];

/// Fetch all RBAC families. A failing query logs and contributes an empty
/// list.
pub async fn collect_raw(client: &ClickHouseClient) -> Map<String, Value> {
    let mut data = Map::new();
    for (key, query) in QUERIES {
        match client.execute_json(query).await {
            Ok(rows) => {
                data.insert(key.to_string(), Value::Array(rows));
            }
            Err(e) => {
                warn!(family = key, error = %e, "Collector query failed, storing empty family");
                data.insert(key.to_string(), Value::Array(Vec::new()));
            }
        }
    }
    data
}

/// Persist normalized entities from a raw payload under `snapshot_id`.
pub async fn normalize_and_store(
    store: &SnapshotStore,
    snapshot_id: i64,
    raw: &Map<String, Value>,
) -> Result<(), DbError> {
    for user in family(raw, "users") {
        store
            .insert_user(
                snapshot_id,
                str_field(user, "name"),
                str_field(user, "id"),
                opt_str_field(user, "storage"),
                opt_str_field(user, "auth_type"),
                &json_array_field(user, "host_ip"),
                &json_array_field(user, "host_names"),
                bool_field(user, "default_roles_all"),
                &json_array_field(user, "default_roles_list"),
                bool_field(user, "grantees_any"),
                &json_array_field(user, "grantees_list"),
            )
            .await?;
    }

    for role in family(raw, "roles") {
        store
            .insert_role(
                snapshot_id,
                str_field(role, "name"),
                str_field(role, "id"),
                opt_str_field(role, "storage"),
            )
            .await?;
    }

    for rg in family(raw, "role_grants") {
        store
            .insert_role_grant(
                snapshot_id,
                opt_str_field(rg, "user_name"),
                opt_str_field(rg, "role_name"),
                str_field(rg, "granted_role_name"),
                bool_field(rg, "granted_role_is_default"),
                bool_field(rg, "with_admin_option"),
            )
            .await?;
    }

    for grant in family(raw, "grants") {
        store
            .insert_privilege(
                snapshot_id,
                opt_str_field(grant, "user_name"),
                opt_str_field(grant, "role_name"),
                str_field(grant, "access_type"),
                opt_str_field(grant, "database"),
                opt_str_field(grant, "table"),
                opt_str_field(grant, "column"),
                bool_field(grant, "is_partial_revoke"),
                bool_field(grant, "grant_option"),
            )
            .await?;
    }

    Ok(())
}

/// End-to-end: open a run, collect, normalize, store, close the run.
pub async fn run_collection(
    cluster_id: i64,
    client: &ClickHouseClient,
    store: &SnapshotStore,
) -> Result<SnapshotRun, DbError> {
    let run = store.create_run(cluster_id).await?;

    let raw = collect_raw(client).await;
    let payload = serde_json::to_string(&Value::Object(raw.clone()))?;

    match normalize_and_store(store, run.id, &raw).await {
        Ok(()) => {
            store.complete_run(run.id, &payload).await?;
            info!(snapshot_id = run.id, cluster_id, "Snapshot collected");
        }
        Err(e) => {
            warn!(snapshot_id = run.id, error = %e, "Snapshot collection failed");
            store.fail_run(run.id, &e.to_string()).await?;
        }
    }
    store.get_run(run.id).await
}

// ── field coercion helpers ──────────────────────────────────────────────

fn family<'a>(raw: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

fn str_field<'a>(row: &'a Value, key: &str) -> &'a str {
    row.get(key).and_then(Value::as_str).unwrap_or("")
}

/// Empty strings become None; ClickHouse uses '' for absent scope fields.
fn opt_str_field<'a>(row: &'a Value, key: &str) -> Option<&'a str> {
    row.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Booleans arrive as 0/1 from system tables; tolerate real booleans too.
fn bool_field(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
}

/// Array fields are stored as canonical JSON arrays; scalars are wrapped,
/// absent values become `[]`.
fn json_array_field(row: &Value, key: &str) -> String {
    let value = match row.get(key) {
        Some(Value::Array(a)) => Value::Array(a.clone()),
        Some(Value::Null) | None => json!([]),
        Some(other) => json!([other.clone()]),
    };
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_db::{create_pool, DbConfig};
    use serde_json::json;

    fn sample_raw() -> Map<String, Value> {
        let payload = json!({
            "users": [
                {"name": "alice", "id": "uuid-1", "storage": "local_directory",
                 "auth_type": "sha256_password", "host_ip": ["::/0"],
                 "default_roles_all": 1, "default_roles_list": [],
                 "grantees_any": 1, "grantees_list": []}
            ],
            "roles": [{"name": "readers", "id": "uuid-2", "storage": "local_directory"}],
            "role_grants": [
                {"user_name": "alice", "role_name": "", "granted_role_name": "readers",
                 "granted_role_is_default": 1, "with_admin_option": 0}
            ],
            "grants": [
                {"user_name": "", "role_name": "readers", "access_type": "SELECT",
                 "database": "analytics", "table": "", "column": "",
                 "is_partial_revoke": 0, "grant_option": 0}
            ],
            "settings_profiles": [],
            "settings_elements": [],
            "quotas": []
        });
        match payload {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn test_normalize_and_store() {
        let pool = create_pool(DbConfig::sqlite_memory()).await.unwrap();
        crate::db::schema::ensure_schema(&pool).await.unwrap();
        let store = SnapshotStore::new(pool.clone());
        let run = store.create_run(1).await.unwrap();

        normalize_and_store(&store, run.id, &sample_raw()).await.unwrap();

        let counts = store.counts(run.id).await.unwrap();
        assert_eq!(counts.users, 1);
        assert_eq!(counts.roles, 1);
        assert_eq!(counts.grants, 1);

        // Empty strings normalize to NULL, 0/1 to booleans, arrays to JSON.
        let user: crate::db::models::SnapshotUser =
            sqlx::query_as("SELECT * FROM snapshot_users WHERE snapshot_id = ?")
                .bind(run.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(user.default_roles_all);
        assert_eq!(user.host_ip.as_deref(), Some(r#"["::/0"]"#));

        let grant: crate::db::models::SnapshotPrivilege =
            sqlx::query_as("SELECT * FROM snapshot_privileges WHERE snapshot_id = ?")
                .bind(run.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(grant.user_name, None);
        assert_eq!(grant.role_name.as_deref(), Some("readers"));
        assert_eq!(grant.database.as_deref(), Some("analytics"));
        assert_eq!(grant.table_name, None);
        assert!(!grant.is_partial_revoke);
    }

    #[test]
    fn test_field_coercions() {
        let row = json!({"flag": 1, "other": true, "list": ["a"], "scalar": "x", "empty": ""});
        assert!(bool_field(&row, "flag"));
        assert!(bool_field(&row, "other"));
        assert!(!bool_field(&row, "missing"));
        assert_eq!(json_array_field(&row, "list"), r#"["a"]"#);
        assert_eq!(json_array_field(&row, "scalar"), r#"["x"]"#);
        assert_eq!(json_array_field(&row, "missing"), "[]");
        assert_eq!(opt_str_field(&row, "empty"), None);
        assert_eq!(opt_str_field(&row, "scalar"), Some("x"));
    }
}
