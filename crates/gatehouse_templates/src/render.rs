//! The rendering core shared by the preview and executor builders.

use serde_json::Value;

use crate::ops::{DefaultRolesSpec, Operation, QuotaInterval};
use crate::safety::{
    escape_string, quote_identifier, quote_scope, validate_interval, validate_privilege,
    TemplateError,
};

/// How password parameters are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretStyle {
    /// Render `'***'` in place of the password. Used for previews.
    Masked,
    /// Render the escaped plaintext. Used at execution time only.
    Plain,
}

/// A rendered operation: the forward DDL plus its inverse, when one exists.
///
/// Compensation is never applied automatically - it is surfaced so an
/// operator can plan a manual rollback. Password changes, drops, and
/// in-place `ALTER ... SETTINGS` overwrites have no inverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub compensation: Option<String>,
}

impl Statement {
    fn new(sql: String, compensation: Option<String>) -> Self {
        Self { sql, compensation }
    }
}

fn require<'a>(value: &'a Option<String>, key: &'static str) -> Result<&'a str, TemplateError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(TemplateError::MissingParam(key)),
    }
}

fn rendered_password(password: &str, secrets: SecretStyle) -> String {
    match secrets {
        SecretStyle::Masked => "***".to_string(),
        SecretStyle::Plain => escape_string(password),
    }
}

/// Render `(forward_sql, compensation_sql)` for a parsed operation.
pub fn render(op: &Operation, secrets: SecretStyle) -> Result<Statement, TemplateError> {
    match op {
        Operation::CreateUser(p) => {
            let user = quote_identifier(require(&p.username, "username")?)?;
            let pwd = rendered_password(require(&p.password, "password")?, secrets);
            let mut sql = format!("CREATE USER {user} IDENTIFIED WITH sha256_password BY '{pwd}'");
            if let Some(hosts) = p.host_ip.as_deref().filter(|h| !h.is_empty()) {
                let hosts = hosts
                    .iter()
                    .map(|h| format!("'{}'", escape_string(h)))
                    .collect::<Vec<_>>()
                    .join(", ");
                sql.push_str(&format!(" HOST IP {hosts}"));
            }
            if let Some(roles) = p.default_roles.as_deref().filter(|r| !r.is_empty()) {
                let roles = quote_all(roles)?.join(", ");
                sql.push_str(&format!(" DEFAULT ROLE {roles}"));
            }
            Ok(Statement::new(sql, Some(format!("DROP USER IF EXISTS {user}"))))
        }

        Operation::AlterUserPassword(p) => {
            let user = quote_identifier(require(&p.username, "username")?)?;
            let pwd = rendered_password(require(&p.password, "password")?, secrets);
            let sql = format!("ALTER USER {user} IDENTIFIED WITH sha256_password BY '{pwd}'");
            // The previous password is unrecoverable.
            Ok(Statement::new(sql, None))
        }

        Operation::DropUser(p) => {
            let user = quote_identifier(require(&p.username, "username")?)?;
            Ok(Statement::new(format!("DROP USER IF EXISTS {user}"), None))
        }

        Operation::CreateRole(p) => {
            let role = quote_identifier(require(&p.role_name, "role_name")?)?;
            Ok(Statement::new(
                format!("CREATE ROLE {role}"),
                Some(format!("DROP ROLE IF EXISTS {role}")),
            ))
        }

        Operation::DropRole(p) => {
            let role = quote_identifier(require(&p.role_name, "role_name")?)?;
            Ok(Statement::new(format!("DROP ROLE IF EXISTS {role}"), None))
        }

        Operation::GrantRole(p) => {
            require(&p.target_type, "target_type")?;
            let role = quote_identifier(require(&p.role_name, "role_name")?)?;
            let target = quote_identifier(require(&p.target_name, "target_name")?)?;
            Ok(Statement::new(
                format!("GRANT {role} TO {target}"),
                Some(format!("REVOKE {role} FROM {target}")),
            ))
        }

        Operation::RevokeRole(p) => {
            require(&p.target_type, "target_type")?;
            let role = quote_identifier(require(&p.role_name, "role_name")?)?;
            let target = quote_identifier(require(&p.target_name, "target_name")?)?;
            Ok(Statement::new(
                format!("REVOKE {role} FROM {target}"),
                Some(format!("GRANT {role} TO {target}")),
            ))
        }

        Operation::SetDefaultRoles(p) => {
            let user = quote_identifier(require(&p.username, "username")?)?;
            let roles = match p.roles.as_ref().ok_or(TemplateError::MissingParam("roles"))? {
                DefaultRolesSpec::List(list) if !list.is_empty() => quote_all(list)?.join(", "),
                DefaultRolesSpec::List(_) => "NONE".to_string(),
                DefaultRolesSpec::Keyword(k) if k == "ALL" => "ALL".to_string(),
                DefaultRolesSpec::Keyword(_) => "NONE".to_string(),
            };
            Ok(Statement::new(format!("SET DEFAULT ROLE {roles} TO {user}"), None))
        }

        Operation::GrantPrivilege(p) => {
            require(&p.target_type, "target_type")?;
            let priv_ = checked_privilege(&p.privilege)?;
            let scope = quote_scope(p.database.as_deref(), p.table.as_deref())?;
            let target = quote_identifier(require(&p.target_name, "target_name")?)?;
            Ok(Statement::new(
                format!("GRANT {priv_} ON {scope} TO {target}"),
                Some(format!("REVOKE {priv_} ON {scope} FROM {target}")),
            ))
        }

        Operation::RevokePrivilege(p) => {
            require(&p.target_type, "target_type")?;
            let priv_ = checked_privilege(&p.privilege)?;
            let scope = quote_scope(p.database.as_deref(), p.table.as_deref())?;
            let target = quote_identifier(require(&p.target_name, "target_name")?)?;
            Ok(Statement::new(
                format!("REVOKE {priv_} ON {scope} FROM {target}"),
                Some(format!("GRANT {priv_} ON {scope} TO {target}")),
            ))
        }

        Operation::CreateSettingsProfile(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let settings = p.settings.as_ref().ok_or(TemplateError::MissingParam("settings"))?;
            let clause = settings_clause(settings)?;
            Ok(Statement::new(
                format!("CREATE SETTINGS PROFILE {name} SETTINGS {clause}"),
                Some(format!("DROP SETTINGS PROFILE IF EXISTS {name}")),
            ))
        }

        Operation::AlterSettingsProfile(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let settings = p.settings.as_ref().ok_or(TemplateError::MissingParam("settings"))?;
            let clause = settings_clause(settings)?;
            // Overwrites in place; the prior settings are gone.
            Ok(Statement::new(
                format!("ALTER SETTINGS PROFILE {name} SETTINGS {clause}"),
                None,
            ))
        }

        Operation::DropSettingsProfile(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            Ok(Statement::new(
                format!("DROP SETTINGS PROFILE IF EXISTS {name}"),
                None,
            ))
        }

        Operation::AssignSettingsProfile(p) => {
            let target = quote_identifier(require(&p.target_name, "target_name")?)?;
            let profile = quote_identifier(require(&p.profile_name, "profile_name")?)?;
            Ok(Statement::new(
                format!("ALTER USER {target} SETTINGS PROFILE {profile}"),
                None,
            ))
        }

        Operation::CreateQuota(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let intervals = p.intervals.as_ref().ok_or(TemplateError::MissingParam("intervals"))?;
            let clause = quota_clause(intervals)?;
            Ok(Statement::new(
                format!("CREATE QUOTA {name} {clause}"),
                Some(format!("DROP QUOTA IF EXISTS {name}")),
            ))
        }

        Operation::AlterQuota(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let intervals = p.intervals.as_ref().ok_or(TemplateError::MissingParam("intervals"))?;
            let clause = quota_clause(intervals)?;
            Ok(Statement::new(format!("ALTER QUOTA {name} {clause}"), None))
        }

        Operation::DropQuota(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            Ok(Statement::new(format!("DROP QUOTA IF EXISTS {name}"), None))
        }

        Operation::AssignQuota(p) => {
            let target = quote_identifier(require(&p.target_name, "target_name")?)?;
            let quota = quote_identifier(require(&p.quota_name, "quota_name")?)?;
            Ok(Statement::new(
                format!("ALTER USER {target} QUOTA {quota}"),
                None,
            ))
        }

        Operation::CreateRowPolicy(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let db = quote_identifier(require(&p.database, "database")?)?;
            let table = quote_identifier(require(&p.table, "table")?)?;
            let condition = p.condition.as_deref().unwrap_or("1");
            let kind = if p.restrictive { "RESTRICTIVE" } else { "PERMISSIVE" };
            let mut sql = format!(
                "CREATE ROW POLICY {name} ON {db}.{table} AS {kind} FOR SELECT USING {condition}"
            );
            if let Some(targets) = p.apply_to.as_deref().filter(|t| !t.is_empty()) {
                sql.push_str(&format!(" TO {}", quote_all(targets)?.join(", ")));
            }
            Ok(Statement::new(
                sql,
                Some(format!("DROP ROW POLICY IF EXISTS {name} ON {db}.{table}")),
            ))
        }

        Operation::AlterRowPolicy(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let db = quote_identifier(require(&p.database, "database")?)?;
            let table = quote_identifier(require(&p.table, "table")?)?;
            let mut parts = vec![format!("ALTER ROW POLICY {name} ON {db}.{table}")];
            if let Some(condition) = p.condition.as_deref().filter(|c| !c.is_empty()) {
                parts.push(format!("USING {condition}"));
            }
            if let Some(targets) = p.apply_to.as_deref().filter(|t| !t.is_empty()) {
                parts.push(format!("TO {}", quote_all(targets)?.join(", ")));
            }
            Ok(Statement::new(parts.join(" "), None))
        }

        Operation::DropRowPolicy(p) => {
            let name = quote_identifier(require(&p.name, "name")?)?;
            let db = quote_identifier(require(&p.database, "database")?)?;
            let table = quote_identifier(require(&p.table, "table")?)?;
            Ok(Statement::new(
                format!("DROP ROW POLICY IF EXISTS {name} ON {db}.{table}"),
                None,
            ))
        }
    }
}

fn quote_all(names: &[String]) -> Result<Vec<String>, TemplateError> {
    names.iter().map(|n| quote_identifier(n)).collect()
}

fn checked_privilege(privilege: &Option<String>) -> Result<String, TemplateError> {
    let priv_ = require(privilege, "privilege")?.to_ascii_uppercase();
    if !validate_privilege(&priv_) {
        return Err(TemplateError::DisallowedPrivilege(priv_));
    }
    Ok(priv_)
}

/// Render `key = value, ...` for a settings profile. Setting names must be
/// identifiers; numeric values render bare, everything else as an escaped
/// string literal.
fn settings_clause(settings: &serde_json::Map<String, Value>) -> Result<String, TemplateError> {
    let mut parts = Vec::with_capacity(settings.len());
    for (key, value) in settings {
        if !crate::safety::validate_identifier(key) {
            return Err(TemplateError::InvalidSettingName(key.clone()));
        }
        let rendered = match value {
            Value::Number(n) => n.to_string(),
            Value::String(s) => format!("'{}'", escape_string(s)),
            other => format!("'{}'", escape_string(&other.to_string())),
        };
        parts.push(format!("{key} = {rendered}"));
    }
    Ok(parts.join(", "))
}

/// Render `FOR INTERVAL <dur> MAX k = v, ...` clauses for a quota.
fn quota_clause(intervals: &[QuotaInterval]) -> Result<String, TemplateError> {
    let mut parts = Vec::with_capacity(intervals.len());
    for interval in intervals {
        let duration = interval.duration.as_deref().unwrap_or("1 hour");
        if !validate_interval(duration) {
            return Err(TemplateError::InvalidInterval(duration.to_string()));
        }
        let mut limit_parts = Vec::with_capacity(interval.limits.len());
        for (key, value) in &interval.limits {
            if !crate::safety::validate_identifier(key) {
                return Err(TemplateError::InvalidLimitName(key.clone()));
            }
            let limit = value
                .as_i64()
                .or_else(|| value.as_f64().map(|f| f as i64))
                .ok_or_else(|| TemplateError::InvalidLimitValue(key.clone()))?;
            limit_parts.push(format!("{key} = {limit}"));
        }
        parts.push(format!("FOR INTERVAL {duration} MAX {}", limit_parts.join(", ")));
    }
    Ok(parts.join(" "))
}
