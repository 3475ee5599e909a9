//! Template-driven DDL generation for RBAC operations.
//!
//! Every statement is built from validated parameters - never from raw SQL
//! supplied by a caller. Two entry points share one rendering core:
//!
//! - [`generate_preview`] masks secrets and folds failures into comment
//!   strings; the governance service uses it when a proposal is drafted.
//! - [`build_statement`] is strict and re-renders from params at execution
//!   time; the executor never trusts a previously stored SQL string.
//!
//! Because both paths run the same `render` over the same parsed
//! [`Operation`], a preview differs from the executed statement only where
//! a password was replaced by `'***'`.

pub mod ops;
pub mod preview;
pub mod render;
pub mod safety;

pub use ops::Operation;
pub use preview::{generate_preview, Preview};
pub use render::{render, SecretStyle, Statement};
pub use safety::{
    escape_string, is_broad_privilege, quote_identifier, quote_scope, validate_identifier,
    validate_interval, validate_privilege, TemplateError,
};

/// Build the forward and compensation SQL for an operation, strictly.
///
/// This is the executor-side builder: any invalid or missing parameter is a
/// fatal [`TemplateError`] for the step.
pub fn build_statement(
    operation_type: &str,
    params: &serde_json::Value,
) -> Result<Statement, TemplateError> {
    let op = Operation::parse(operation_type, params)?;
    render(&op, SecretStyle::Plain)
}
