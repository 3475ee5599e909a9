//! Statement redaction for logs.

const PASSWORD_MARKER: &str = "BY '";

/// Redact the password from an `IDENTIFIED WITH ... BY '...'` clause.
///
/// Everything from the opening quote onward is replaced with `***'`, so the
/// plaintext never reaches a log line or an error message. Statements
/// without a password clause pass through unchanged.
pub fn redact_statement(sql: &str) -> String {
    match sql.find(PASSWORD_MARKER) {
        Some(idx) => {
            let mut redacted = sql[..idx + PASSWORD_MARKER.len()].to_string();
            redacted.push_str("***'");
            redacted
        }
        None => sql.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redacts_password_clause() {
        let sql = "CREATE USER `u` IDENTIFIED WITH sha256_password BY 'hunter2' HOST IP '1.2.3.4'";
        assert_eq!(
            redact_statement(sql),
            "CREATE USER `u` IDENTIFIED WITH sha256_password BY '***'"
        );
    }

    #[test]
    fn test_leaves_other_statements_alone() {
        let sql = "GRANT SELECT ON `db`.`t` TO `u`";
        assert_eq!(redact_statement(sql), sql);
    }
}
