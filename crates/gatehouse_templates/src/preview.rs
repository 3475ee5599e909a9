//! Tolerant preview generation for proposal drafting.
//!
//! Preview never fails: problems become SQL comments so an operator can see
//! exactly which operation of a draft is broken. The strict counterpart is
//! [`crate::build_statement`], which the executor re-runs from params.

use serde_json::Value;

use crate::ops::Operation;
use crate::render::{render, SecretStyle};
use crate::safety::is_broad_privilege;

/// A rendered preview for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    /// Masked forward SQL, or a `--` comment describing the problem.
    pub sql: String,
    pub compensation: Option<String>,
    /// Set when the operation grants or revokes a broad privilege.
    pub warning: Option<String>,
}

/// Render a masked preview for an operation.
pub fn generate_preview(operation_type: &str, params: &Value) -> Preview {
    let op = match Operation::parse(operation_type, params) {
        Ok(op) => op,
        Err(crate::TemplateError::UnknownOperation(op)) => {
            return Preview {
                sql: format!("-- Unknown operation: {op}"),
                compensation: None,
                warning: None,
            }
        }
        Err(e) => {
            return Preview {
                sql: format!("-- Error: {e}"),
                compensation: None,
                warning: None,
            }
        }
    };

    let warning = broad_privilege_warning(&op);
    match render(&op, SecretStyle::Masked) {
        Ok(stmt) => Preview {
            sql: stmt.sql,
            compensation: stmt.compensation,
            warning,
        },
        Err(e) => Preview {
            sql: format!("-- Error: {e}"),
            compensation: None,
            warning,
        },
    }
}

fn broad_privilege_warning(op: &Operation) -> Option<String> {
    let privilege = match op {
        Operation::GrantPrivilege(p) | Operation::RevokePrivilege(p) => p.privilege.as_deref()?,
        _ => return None,
    };
    if is_broad_privilege(privilege) {
        Some(format!(
            "{} is a broad privilege; review the scope carefully",
            privilege.to_ascii_uppercase()
        ))
    } else {
        None
    }
}
