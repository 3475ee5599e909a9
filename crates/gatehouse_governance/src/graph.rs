//! In-memory RBAC graph resolver.
//!
//! Built per request from a snapshot's raw payload; nothing here is shared
//! across requests or suspends. Role inheritance may contain cycles (the
//! cluster permits them), so every walk carries a visited set and each
//! branch gets its own path vector.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

/// One granted-role edge (user -> role or role -> parent role).
#[derive(Debug, Clone)]
struct RoleEdge {
    granted_role_name: String,
    is_default: bool,
}

/// A privilege row attached to a user or role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrivilegeEntry {
    pub access_type: String,
    pub database: Option<String>,
    pub table: Option<String>,
    pub column: Option<String>,
    pub is_partial_revoke: bool,
    pub grant_option: bool,
}

/// A role reachable from a seed, with its derivation path.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedRole {
    pub role_name: String,
    pub is_direct: bool,
    pub is_default: bool,
    pub path: Vec<String>,
}

/// A role inherited by another role.
#[derive(Debug, Clone, Serialize)]
pub struct InheritedRole {
    pub role_name: String,
    pub path: Vec<String>,
}

/// An effective privilege with its source attribution.
#[derive(Debug, Clone, Serialize)]
pub struct EffectivePrivilege {
    #[serde(flatten)]
    pub privilege: PrivilegeEntry,
    /// `direct` or `role`.
    pub source: String,
    pub source_name: String,
    pub path: Vec<String>,
}

/// A direct member of a role.
#[derive(Debug, Clone, Serialize)]
pub struct RoleMember {
    pub name: String,
    #[serde(rename = "type")]
    pub member_type: String,
}

/// Per-user aggregate for the object access map.
#[derive(Debug, Clone, Serialize)]
pub struct ObjectAccessEntry {
    pub name: String,
    pub entity_type: String,
    pub access_types: Vec<String>,
    pub source: String,
}

/// In-memory graph built from a single RBAC snapshot.
pub struct RbacGraph {
    user_order: Vec<String>,
    users: HashMap<String, Value>,
    role_order: Vec<String>,
    roles: HashMap<String, Value>,
    user_roles: HashMap<String, Vec<RoleEdge>>,
    role_parents: HashMap<String, Vec<RoleEdge>>,
    user_grants: HashMap<String, Vec<PrivilegeEntry>>,
    role_grants: HashMap<String, Vec<PrivilegeEntry>>,
    settings_profiles: Vec<Value>,
}

impl RbacGraph {
    /// Build adjacency maps from a raw snapshot payload. Insertion order of
    /// users and roles is preserved so iteration is deterministic.
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        let mut user_order = Vec::new();
        let mut users = HashMap::new();
        for row in rows(raw, "users") {
            let name = text(row, "name");
            if name.is_empty() {
                continue;
            }
            if !users.contains_key(&name) {
                user_order.push(name.clone());
            }
            users.insert(name, row.clone());
        }

        let mut role_order = Vec::new();
        let mut roles = HashMap::new();
        for row in rows(raw, "roles") {
            let name = text(row, "name");
            if name.is_empty() {
                continue;
            }
            if !roles.contains_key(&name) {
                role_order.push(name.clone());
            }
            roles.insert(name, row.clone());
        }

        let mut user_roles: HashMap<String, Vec<RoleEdge>> = HashMap::new();
        let mut role_parents: HashMap<String, Vec<RoleEdge>> = HashMap::new();
        for row in rows(raw, "role_grants") {
            let edge = RoleEdge {
                granted_role_name: text(row, "granted_role_name"),
                is_default: truthy(row, "granted_role_is_default"),
            };
            let user = text(row, "user_name");
            let role = text(row, "role_name");
            if !user.is_empty() {
                user_roles.entry(user).or_default().push(edge);
            } else if !role.is_empty() {
                role_parents.entry(role).or_default().push(edge);
            }
        }

        let mut user_grants: HashMap<String, Vec<PrivilegeEntry>> = HashMap::new();
        let mut role_grants: HashMap<String, Vec<PrivilegeEntry>> = HashMap::new();
        for row in rows(raw, "grants") {
            let entry = PrivilegeEntry {
                access_type: text(row, "access_type"),
                database: opt_text(row, "database"),
                table: opt_text(row, "table"),
                column: opt_text(row, "column"),
                is_partial_revoke: truthy(row, "is_partial_revoke"),
                grant_option: truthy(row, "grant_option"),
            };
            let user = text(row, "user_name");
            let role = text(row, "role_name");
            if !user.is_empty() {
                user_grants.entry(user).or_default().push(entry);
            } else if !role.is_empty() {
                role_grants.entry(role).or_default().push(entry);
            }
        }

        let settings_profiles = rows(raw, "settings_profiles").cloned().collect();

        Self {
            user_order,
            users,
            role_order,
            roles,
            user_roles,
            role_parents,
            user_grants,
            role_grants,
            settings_profiles,
        }
    }

    // ── lookups ─────────────────────────────────────────────────────────

    pub fn user_names(&self) -> &[String] {
        &self.user_order
    }

    pub fn role_names(&self) -> &[String] {
        &self.role_order
    }

    pub fn user_info(&self, name: &str) -> Option<&Value> {
        self.users.get(name)
    }

    pub fn role_info(&self, name: &str) -> Option<&Value> {
        self.roles.get(name)
    }

    /// Direct (non-revoke) grants on a user, for summary counts.
    pub fn user_direct_grant_count(&self, name: &str) -> usize {
        self.user_grants
            .get(name)
            .map(|grants| grants.iter().filter(|g| !g.is_partial_revoke).count())
            .unwrap_or(0)
    }

    pub fn role_direct_grant_count(&self, name: &str) -> usize {
        self.role_grants
            .get(name)
            .map(|grants| grants.iter().filter(|g| !g.is_partial_revoke).count())
            .unwrap_or(0)
    }

    // ── role resolution ─────────────────────────────────────────────────

    /// All roles (direct and inherited) for a user, with derivation paths.
    /// A role reached twice (including via a cycle) is reported once.
    pub fn resolve_user_roles(&self, user_name: &str) -> Vec<ResolvedRole> {
        let mut result = Vec::new();
        let mut visited = std::collections::HashSet::new();

        for edge in self.user_roles.get(user_name).map(Vec::as_slice).unwrap_or(&[]) {
            self.walk_role(
                &edge.granted_role_name,
                vec![user_name.to_string(), edge.granted_role_name.clone()],
                true,
                edge.is_default,
                &mut visited,
                &mut result,
            );
        }
        result
    }

    fn walk_role(
        &self,
        role_name: &str,
        path: Vec<String>,
        is_direct: bool,
        is_default: bool,
        visited: &mut std::collections::HashSet<String>,
        result: &mut Vec<ResolvedRole>,
    ) {
        if !visited.insert(role_name.to_string()) {
            return;
        }
        result.push(ResolvedRole {
            role_name: role_name.to_string(),
            is_direct,
            is_default,
            path: path.clone(),
        });
        for parent in self.role_parents.get(role_name).map(Vec::as_slice).unwrap_or(&[]) {
            let mut next_path = path.clone();
            next_path.push(parent.granted_role_name.clone());
            self.walk_role(&parent.granted_role_name, next_path, false, false, visited, result);
        }
    }

    /// Roles inherited by `role_name`, recursively.
    pub fn resolve_role_parents(&self, role_name: &str) -> Vec<InheritedRole> {
        let mut result = Vec::new();
        let mut visited = std::collections::HashSet::new();
        for parent in self.role_parents.get(role_name).map(Vec::as_slice).unwrap_or(&[]) {
            self.walk_parents(
                &parent.granted_role_name,
                vec![role_name.to_string(), parent.granted_role_name.clone()],
                &mut visited,
                &mut result,
            );
        }
        result
    }

    fn walk_parents(
        &self,
        role_name: &str,
        path: Vec<String>,
        visited: &mut std::collections::HashSet<String>,
        result: &mut Vec<InheritedRole>,
    ) {
        if !visited.insert(role_name.to_string()) {
            return;
        }
        result.push(InheritedRole {
            role_name: role_name.to_string(),
            path: path.clone(),
        });
        for parent in self.role_parents.get(role_name).map(Vec::as_slice).unwrap_or(&[]) {
            let mut next_path = path.clone();
            next_path.push(parent.granted_role_name.clone());
            self.walk_parents(&parent.granted_role_name, next_path, visited, result);
        }
    }

    // ── effective privileges ────────────────────────────────────────────

    /// Effective privileges for a user: every positive grant reachable
    /// through the role graph, minus those covered by a partial revoke with
    /// the same access type.
    pub fn resolve_effective_privileges(&self, user_name: &str) -> Vec<EffectivePrivilege> {
        let all_roles = self.resolve_user_roles(user_name);

        let mut collected: Vec<EffectivePrivilege> = Vec::new();
        for entry in self.user_grants.get(user_name).map(Vec::as_slice).unwrap_or(&[]) {
            collected.push(EffectivePrivilege {
                privilege: entry.clone(),
                source: "direct".to_string(),
                source_name: user_name.to_string(),
                path: vec![user_name.to_string()],
            });
        }
        for role in &all_roles {
            for entry in self.role_grants.get(&role.role_name).map(Vec::as_slice).unwrap_or(&[]) {
                collected.push(EffectivePrivilege {
                    privilege: entry.clone(),
                    source: "role".to_string(),
                    source_name: role.role_name.clone(),
                    path: role.path.clone(),
                });
            }
        }

        let (revokes, grants): (Vec<_>, Vec<_>) = collected
            .into_iter()
            .partition(|p| p.privilege.is_partial_revoke);

        grants
            .into_iter()
            .filter(|g| {
                !revokes.iter().any(|r| {
                    r.privilege.access_type == g.privilege.access_type
                        && scope_covers(&r.privilege, &g.privilege)
                })
            })
            .collect()
    }

    /// Direct grants on a role, attributed to itself.
    pub fn resolve_role_grants(&self, role_name: &str) -> Vec<EffectivePrivilege> {
        self.role_grants
            .get(role_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|entry| EffectivePrivilege {
                privilege: entry.clone(),
                source: "direct".to_string(),
                source_name: role_name.to_string(),
                path: vec![role_name.to_string()],
            })
            .collect()
    }

    /// Direct members only: users and roles whose direct grants include
    /// this role.
    pub fn role_members(&self, role_name: &str) -> Vec<RoleMember> {
        let mut members = Vec::new();
        for user in &self.user_order {
            if let Some(edges) = self.user_roles.get(user) {
                if edges.iter().any(|e| e.granted_role_name == role_name) {
                    members.push(RoleMember {
                        name: user.clone(),
                        member_type: "user".to_string(),
                    });
                }
            }
        }
        for role in &self.role_order {
            if let Some(edges) = self.role_parents.get(role) {
                if edges.iter().any(|e| e.granted_role_name == role_name) {
                    members.push(RoleMember {
                        name: role.clone(),
                        member_type: "role".to_string(),
                    });
                }
            }
        }
        members
    }

    // ── object access map ───────────────────────────────────────────────

    /// Every user with effective access to `database[.table]`, with their
    /// access types (sorted, deduped) and contributing sources.
    pub fn object_access(&self, database: &str, table: Option<&str>) -> Vec<ObjectAccessEntry> {
        let mut entries = Vec::new();
        for user in &self.user_order {
            let privileges = self.resolve_effective_privileges(user);
            let matching: Vec<&EffectivePrivilege> = privileges
                .iter()
                .filter(|p| privilege_matches_object(&p.privilege, database, table))
                .collect();
            if matching.is_empty() {
                continue;
            }

            let mut access_types: Vec<String> = matching
                .iter()
                .map(|p| p.privilege.access_type.clone())
                .collect();
            access_types.sort();
            access_types.dedup();

            let mut sources: Vec<String> = matching.iter().map(|p| p.source_name.clone()).collect();
            sources.sort();
            sources.dedup();

            entries.push(ObjectAccessEntry {
                name: user.clone(),
                entity_type: "user".to_string(),
                access_types,
                source: sources.join(", "),
            });
        }
        entries
    }

    // ── settings profiles ───────────────────────────────────────────────

    /// Settings profiles that apply to a user (apply-to-all or listed).
    pub fn user_settings_profiles(&self, user_name: &str) -> Vec<Value> {
        self.settings_profiles
            .iter()
            .filter(|profile| {
                if truthy(profile, "apply_to_all") {
                    return true;
                }
                profile
                    .get("apply_to_list")
                    .and_then(Value::as_array)
                    .map(|list| list.iter().any(|v| v.as_str() == Some(user_name)))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }
}

/// Does `revoke` cover (negate) `grant`? Per scope field, a revoke covers
/// when its value is null (wildcard) or equals the grant's value. A revoke
/// narrower than the grant therefore does not cover it.
fn scope_covers(revoke: &PrivilegeEntry, grant: &PrivilegeEntry) -> bool {
    if revoke.database.is_some() && revoke.database != grant.database {
        return false;
    }
    if revoke.table.is_some() && revoke.table != grant.table {
        return false;
    }
    if revoke.column.is_some() && revoke.column != grant.column {
        return false;
    }
    true
}

/// Does a privilege apply to `database[.table]`? Null scope fields are
/// wildcards at their level.
fn privilege_matches_object(privilege: &PrivilegeEntry, database: &str, table: Option<&str>) -> bool {
    match privilege.database.as_deref() {
        None => return true,
        Some(db) if db != database => return false,
        Some(_) => {}
    }
    match (privilege.table.as_deref(), table) {
        (None, _) => true,
        (Some(_), None) => true,
        (Some(pt), Some(t)) => pt == t,
    }
}

// ── raw payload helpers ─────────────────────────────────────────────────

fn rows<'a>(raw: &'a Map<String, Value>, key: &str) -> impl Iterator<Item = &'a Value> {
    raw.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

fn text(row: &Value, key: &str) -> String {
    row.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

fn opt_text(row: &Value, key: &str) -> Option<String> {
    row.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn truthy(row: &Value, key: &str) -> bool {
    match row.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        _ => false,
    }
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

    fn graph_with_inheritance() -> RbacGraph {
        RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "alice"}, {"name": "bob"}],
            "roles": [{"name": "analyst"}, {"name": "readers"}, {"name": "base"}],
            "role_grants": [
                {"user_name": "alice", "granted_role_name": "analyst", "granted_role_is_default": 1},
                {"role_name": "analyst", "granted_role_name": "readers"},
                {"role_name": "readers", "granted_role_name": "base"}
            ],
            "grants": [
                {"role_name": "readers", "access_type": "SELECT", "database": "analytics"},
                {"user_name": "alice", "access_type": "INSERT", "database": "scratch"}
            ]
        })))
    }

    #[test]
    fn test_resolve_user_roles_with_paths() {
        let graph = graph_with_inheritance();
        let roles = graph.resolve_user_roles("alice");
        assert_eq!(roles.len(), 3);

        assert_eq!(roles[0].role_name, "analyst");
        assert!(roles[0].is_direct);
        assert!(roles[0].is_default);
        assert_eq!(roles[0].path, vec!["alice", "analyst"]);

        assert_eq!(roles[1].role_name, "readers");
        assert!(!roles[1].is_direct);
        assert_eq!(roles[1].path, vec!["alice", "analyst", "readers"]);

        assert_eq!(roles[2].role_name, "base");
        assert_eq!(roles[2].path, vec!["alice", "analyst", "readers", "base"]);

        assert!(graph.resolve_user_roles("bob").is_empty());
    }

    #[test]
    fn test_cycle_is_visited_once() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "u"}],
            "roles": [{"name": "a"}, {"name": "b"}],
            "role_grants": [
                {"user_name": "u", "granted_role_name": "a"},
                {"role_name": "a", "granted_role_name": "b"},
                {"role_name": "b", "granted_role_name": "a"}
            ],
            "grants": []
        })));
        let roles = graph.resolve_user_roles("u");
        let names: Vec<&str> = roles.iter().map(|r| r.role_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        // Role-side resolution tolerates the cycle too.
        let parents = graph.resolve_role_parents("a");
        let names: Vec<&str> = parents.iter().map(|r| r.role_name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_effective_privileges_attribution() {
        let graph = graph_with_inheritance();
        let privileges = graph.resolve_effective_privileges("alice");
        assert_eq!(privileges.len(), 2);

        let direct = privileges.iter().find(|p| p.source == "direct").unwrap();
        assert_eq!(direct.privilege.access_type, "INSERT");
        assert_eq!(direct.source_name, "alice");
        assert_eq!(direct.path, vec!["alice"]);

        let via_role = privileges.iter().find(|p| p.source == "role").unwrap();
        assert_eq!(via_role.privilege.access_type, "SELECT");
        assert_eq!(via_role.source_name, "readers");
        assert_eq!(via_role.path, vec!["alice", "analyst", "readers"]);
    }

    #[test]
    fn test_partial_revoke_exact_scope_suppresses() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "u"}],
            "roles": [{"name": "r"}],
            "role_grants": [{"user_name": "u", "granted_role_name": "r"}],
            "grants": [
                {"role_name": "r", "access_type": "SELECT", "database": "db1", "table": "events"},
                {"user_name": "u", "access_type": "SELECT", "database": "db1", "table": "events",
                 "is_partial_revoke": 1}
            ]
        })));
        assert!(graph.resolve_effective_privileges("u").is_empty());
    }

    #[test]
    fn test_partial_revoke_wildcard_covers_narrower_grant() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "u"}],
            "roles": [],
            "role_grants": [],
            "grants": [
                {"user_name": "u", "access_type": "SELECT", "database": "db1", "table": "events"},
                {"user_name": "u", "access_type": "SELECT", "database": "db1",
                 "is_partial_revoke": 1}
            ]
        })));
        // Revoke on db1.* (table null) covers the table-level grant.
        assert!(graph.resolve_effective_privileges("u").is_empty());
    }

    #[test]
    fn test_narrower_revoke_does_not_cover_broader_grant() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "u"}],
            "roles": [{"name": "r"}],
            "role_grants": [{"user_name": "u", "granted_role_name": "r"}],
            "grants": [
                {"role_name": "r", "access_type": "SELECT", "database": "db1"},
                {"user_name": "u", "access_type": "SELECT", "database": "db1", "table": "events",
                 "is_partial_revoke": 1}
            ]
        })));
        // Grant on db1.* survives a revoke scoped to db1.events.
        let privileges = graph.resolve_effective_privileges("u");
        assert_eq!(privileges.len(), 1);
        assert_eq!(privileges[0].privilege.database.as_deref(), Some("db1"));
        assert_eq!(privileges[0].privilege.table, None);
    }

    #[test]
    fn test_revoke_different_access_type_does_not_suppress() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "u"}],
            "roles": [],
            "role_grants": [],
            "grants": [
                {"user_name": "u", "access_type": "SELECT", "database": "db1"},
                {"user_name": "u", "access_type": "INSERT", "database": "db1",
                 "is_partial_revoke": 1}
            ]
        })));
        assert_eq!(graph.resolve_effective_privileges("u").len(), 1);
    }

    #[test]
    fn test_role_members_direct_only() {
        let graph = graph_with_inheritance();
        let members = graph.role_members("readers");
        // analyst inherits readers directly; alice only transitively.
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "analyst");
        assert_eq!(members[0].member_type, "role");

        let members = graph.role_members("analyst");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "alice");
        assert_eq!(members[0].member_type, "user");
    }

    #[test]
    fn test_object_access_aggregation() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "alice"}, {"name": "bob"}, {"name": "carol"}],
            "roles": [{"name": "readers"}],
            "role_grants": [
                {"user_name": "alice", "granted_role_name": "readers"},
                {"user_name": "bob", "granted_role_name": "readers"}
            ],
            "grants": [
                {"role_name": "readers", "access_type": "SELECT", "database": "analytics"},
                {"user_name": "alice", "access_type": "INSERT", "database": "analytics",
                 "table": "events"},
                {"user_name": "carol", "access_type": "SELECT", "database": "other"}
            ]
        })));

        let entries = graph.object_access("analytics", Some("events"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "alice");
        assert_eq!(entries[0].access_types, vec!["INSERT", "SELECT"]);
        assert_eq!(entries[0].source, "alice, readers");
        assert_eq!(entries[1].name, "bob");
        assert_eq!(entries[1].access_types, vec!["SELECT"]);

        // Global grants (no database) match everything.
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "admin"}],
            "roles": [],
            "role_grants": [],
            "grants": [{"user_name": "admin", "access_type": "SELECT"}]
        })));
        assert_eq!(graph.object_access("anything", None).len(), 1);
    }

    #[test]
    fn test_user_settings_profiles() {
        let graph = RbacGraph::from_raw(&raw(json!({
            "users": [{"name": "u"}],
            "roles": [],
            "role_grants": [],
            "grants": [],
            "settings_profiles": [
                {"name": "everyone", "apply_to_all": 1},
                {"name": "listed", "apply_to_all": 0, "apply_to_list": ["u", "v"]},
                {"name": "other", "apply_to_all": 0, "apply_to_list": ["w"]}
            ]
        })));
        let profiles = graph.user_settings_profiles("u");
        let names: Vec<&str> = profiles.iter().map(|p| p["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["everyone", "listed"]);
    }
}
