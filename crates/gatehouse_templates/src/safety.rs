//! Identifier validation and SQL injection prevention.

use thiserror::Error;

/// Raised when operation parameters fail validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Unknown operation type: {0}")]
    UnknownOperation(String),

    #[error("Missing required parameter: {0}")]
    MissingParam(&'static str),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Privilege not in allow-list: {0}")]
    DisallowedPrivilege(String),

    #[error("Invalid quota interval: {0:?}")]
    InvalidInterval(String),

    #[error("Invalid setting name: {0:?}")]
    InvalidSettingName(String),

    #[error("Invalid quota limit name: {0:?}")]
    InvalidLimitName(String),

    #[error("Invalid quota limit value for {0}")]
    InvalidLimitValue(String),

    #[error("Invalid parameters for {operation}: {message}")]
    InvalidParams { operation: String, message: String },
}

const MAX_IDENT_LEN: usize = 64;

/// Returns true if `name` is a safe identifier: `[A-Za-z_][A-Za-z0-9_]*`,
/// 1-64 chars.
pub fn validate_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return false;
    }
    if name.len() > MAX_IDENT_LEN {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier with backticks, rejecting anything unsafe.
pub fn quote_identifier(name: &str) -> Result<String, TemplateError> {
    if !validate_identifier(name) {
        return Err(TemplateError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{}`", name))
}

/// Escape a string value for use inside a single-quoted SQL literal.
pub fn escape_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build a safe scope expression: `*.*`, `` `db`.* `` or `` `db`.`table` ``.
///
/// Empty and `*` both mean wildcard at their level.
pub fn quote_scope(database: Option<&str>, table: Option<&str>) -> Result<String, TemplateError> {
    let db = match database {
        None | Some("") | Some("*") => return Ok("*.*".to_string()),
        Some(db) => quote_identifier(db)?,
    };
    match table {
        None | Some("") | Some("*") => Ok(format!("{}.*", db)),
        Some(t) => Ok(format!("{}.{}", db, quote_identifier(t)?)),
    }
}

// ============================================================================
// Privilege allow-list
// ============================================================================

/// Grantable privileges. Compared case-insensitively; rendered uppercase.
const ALLOWED_PRIVILEGES: &[&str] = &[
    "SELECT",
    "INSERT",
    "ALTER",
    "CREATE",
    "DROP",
    "SHOW",
    "SHOW DATABASES",
    "SHOW TABLES",
    "SHOW COLUMNS",
    "CREATE TABLE",
    "CREATE VIEW",
    "CREATE DICTIONARY",
    "CREATE TEMPORARY TABLE",
    "CREATE FUNCTION",
    "ALTER TABLE",
    "ALTER VIEW",
    "TRUNCATE",
    "OPTIMIZE",
    "KILL QUERY",
    "DICTGET",
    "INTROSPECTION",
    "SYSTEM",
    "SOURCES",
    "CLUSTER",
];

pub fn validate_privilege(privilege: &str) -> bool {
    let upper = privilege.to_ascii_uppercase();
    ALLOWED_PRIVILEGES.contains(&upper.as_str())
}

/// Privileges broad enough to warrant a reviewer warning. Warning only -
/// nothing here blocks an otherwise allow-listed privilege.
const BROAD_PRIVILEGES: &[&str] = &[
    "ALL",
    "ALL PRIVILEGES",
    "GRANT OPTION",
    "CREATE",
    "DROP",
    "ALTER",
    "SYSTEM",
];

pub fn is_broad_privilege(privilege: &str) -> bool {
    let upper = privilege.to_ascii_uppercase();
    BROAD_PRIVILEGES.contains(&upper.as_str())
}

// ============================================================================
// Quota intervals
// ============================================================================

/// The closed set of quota interval durations, compared case-insensitively.
const VALID_INTERVALS: &[&str] = &[
    "1 second",
    "1 minute",
    "5 minutes",
    "15 minutes",
    "1 hour",
    "1 day",
    "1 week",
    "1 month",
    "1 quarter",
    "1 year",
];

pub fn validate_interval(interval: &str) -> bool {
    let lower = interval.to_ascii_lowercase();
    VALID_INTERVALS.contains(&lower.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_basic() {
        assert!(validate_identifier("readonly_user"));
        assert!(validate_identifier("_hidden"));
        assert!(validate_identifier("Db2"));
        assert!(!validate_identifier(""));
        assert!(!validate_identifier("2fast"));
        assert!(!validate_identifier("has space"));
        assert!(!validate_identifier("back`tick"));
        assert!(!validate_identifier("apo'strophe"));
        assert!(!validate_identifier("semi;colon"));
    }

    #[test]
    fn test_identifier_length_boundary() {
        let ok = "a".repeat(64);
        let too_long = "a".repeat(65);
        assert!(validate_identifier(&ok));
        assert!(!validate_identifier(&too_long));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("events").unwrap(), "`events`");
        assert!(matches!(
            quote_identifier("x; DROP TABLE y"),
            Err(TemplateError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string("plain"), "plain");
        assert_eq!(escape_string("o'brien"), "o\\'brien");
        assert_eq!(escape_string("back\\slash"), "back\\\\slash");
    }

    #[test]
    fn test_quote_scope() {
        assert_eq!(quote_scope(None, None).unwrap(), "*.*");
        assert_eq!(quote_scope(Some(""), Some("t")).unwrap(), "*.*");
        assert_eq!(quote_scope(Some("*"), None).unwrap(), "*.*");
        assert_eq!(quote_scope(Some("db"), None).unwrap(), "`db`.*");
        assert_eq!(quote_scope(Some("db"), Some("*")).unwrap(), "`db`.*");
        assert_eq!(quote_scope(Some("db"), Some("t")).unwrap(), "`db`.`t`");
        assert!(quote_scope(Some("bad-db"), None).is_err());
        assert!(quote_scope(Some("db"), Some("bad table")).is_err());
    }

    #[test]
    fn test_privilege_allow_list() {
        assert!(validate_privilege("SELECT"));
        assert!(validate_privilege("select"));
        assert!(validate_privilege("Kill Query"));
        assert!(validate_privilege("dictGet"));
        assert!(!validate_privilege("GRANT OPTION"));
        assert!(!validate_privilege("FILE"));
        assert!(!validate_privilege("SELECT; DROP"));
    }

    #[test]
    fn test_broad_privileges() {
        assert!(is_broad_privilege("ALL"));
        assert!(is_broad_privilege("system"));
        assert!(!is_broad_privilege("SELECT"));
    }

    #[test]
    fn test_interval_case_insensitive() {
        assert!(validate_interval("1 hour"));
        assert!(validate_interval("1 HOUR"));
        assert!(validate_interval("1 Quarter"));
        assert!(!validate_interval("2 hours"));
        assert!(!validate_interval("1 fortnight"));
        assert!(!validate_interval(""));
    }
}
