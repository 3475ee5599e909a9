//! Typed operations.
//!
//! The wire carries `{operation_type: String, params: object}`; this module
//! is the single place that string is interpreted. Everything downstream
//! matches exhaustively on [`Operation`], so adding a variant forces every
//! builder to handle it.

use serde::Deserialize;
use serde_json::Value;

use crate::safety::TemplateError;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CreateUserParams {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host_ip: Option<Vec<String>>,
    pub default_roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UserPasswordParams {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct UserParams {
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RoleParams {
    pub role_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RoleAssignmentParams {
    pub role_name: Option<String>,
    pub target_type: Option<String>,
    pub target_name: Option<String>,
}

/// `roles` is either an explicit list or the keyword `ALL` / `NONE`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DefaultRolesSpec {
    List(Vec<String>),
    Keyword(String),
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SetDefaultRolesParams {
    pub username: Option<String>,
    pub roles: Option<DefaultRolesSpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PrivilegeParams {
    pub privilege: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub target_type: Option<String>,
    pub target_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SettingsProfileParams {
    pub name: Option<String>,
    pub settings: Option<serde_json::Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NamedParams {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssignProfileParams {
    pub target_name: Option<String>,
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QuotaInterval {
    pub duration: Option<String>,
    pub limits: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct QuotaParams {
    pub name: Option<String>,
    pub intervals: Option<Vec<QuotaInterval>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AssignQuotaParams {
    pub target_name: Option<String>,
    pub quota_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CreateRowPolicyParams {
    pub name: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    /// Filter expression; defaults to `1` (allow all matched rows).
    pub condition: Option<String>,
    pub restrictive: bool,
    pub apply_to: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AlterRowPolicyParams {
    pub name: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
    pub condition: Option<String>,
    pub apply_to: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RowPolicyRefParams {
    pub name: Option<String>,
    pub database: Option<String>,
    pub table: Option<String>,
}

/// A single RBAC operation, parsed from its wire form.
#[derive(Debug, Clone)]
pub enum Operation {
    CreateUser(CreateUserParams),
    AlterUserPassword(UserPasswordParams),
    DropUser(UserParams),
    CreateRole(RoleParams),
    DropRole(RoleParams),
    GrantRole(RoleAssignmentParams),
    RevokeRole(RoleAssignmentParams),
    SetDefaultRoles(SetDefaultRolesParams),
    GrantPrivilege(PrivilegeParams),
    RevokePrivilege(PrivilegeParams),
    CreateSettingsProfile(SettingsProfileParams),
    AlterSettingsProfile(SettingsProfileParams),
    DropSettingsProfile(NamedParams),
    AssignSettingsProfile(AssignProfileParams),
    CreateQuota(QuotaParams),
    AlterQuota(QuotaParams),
    DropQuota(NamedParams),
    AssignQuota(AssignQuotaParams),
    CreateRowPolicy(CreateRowPolicyParams),
    AlterRowPolicy(AlterRowPolicyParams),
    DropRowPolicy(RowPolicyRefParams),
}

fn parse_params<T: serde::de::DeserializeOwned>(
    operation_type: &str,
    params: &Value,
) -> Result<T, TemplateError> {
    serde_json::from_value(params.clone()).map_err(|e| TemplateError::InvalidParams {
        operation: operation_type.to_string(),
        message: e.to_string(),
    })
}

impl Operation {
    /// Parse an operation from its wire `operation_type` and `params`.
    ///
    /// Missing parameters are not rejected here - each builder checks its
    /// own requirements so error messages name the exact parameter.
    pub fn parse(operation_type: &str, params: &Value) -> Result<Self, TemplateError> {
        let op = match operation_type {
            "create_user" => Self::CreateUser(parse_params(operation_type, params)?),
            "alter_user_password" => Self::AlterUserPassword(parse_params(operation_type, params)?),
            "drop_user" => Self::DropUser(parse_params(operation_type, params)?),
            "create_role" => Self::CreateRole(parse_params(operation_type, params)?),
            "drop_role" => Self::DropRole(parse_params(operation_type, params)?),
            "grant_role" => Self::GrantRole(parse_params(operation_type, params)?),
            "revoke_role" => Self::RevokeRole(parse_params(operation_type, params)?),
            "set_default_roles" => Self::SetDefaultRoles(parse_params(operation_type, params)?),
            "grant_privilege" => Self::GrantPrivilege(parse_params(operation_type, params)?),
            "revoke_privilege" => Self::RevokePrivilege(parse_params(operation_type, params)?),
            "create_settings_profile" => {
                Self::CreateSettingsProfile(parse_params(operation_type, params)?)
            }
            "alter_settings_profile" => {
                Self::AlterSettingsProfile(parse_params(operation_type, params)?)
            }
            "drop_settings_profile" => {
                Self::DropSettingsProfile(parse_params(operation_type, params)?)
            }
            "assign_settings_profile" => {
                Self::AssignSettingsProfile(parse_params(operation_type, params)?)
            }
            "create_quota" => Self::CreateQuota(parse_params(operation_type, params)?),
            "alter_quota" => Self::AlterQuota(parse_params(operation_type, params)?),
            "drop_quota" => Self::DropQuota(parse_params(operation_type, params)?),
            "assign_quota" => Self::AssignQuota(parse_params(operation_type, params)?),
            "create_row_policy" => Self::CreateRowPolicy(parse_params(operation_type, params)?),
            "alter_row_policy" => Self::AlterRowPolicy(parse_params(operation_type, params)?),
            "drop_row_policy" => Self::DropRowPolicy(parse_params(operation_type, params)?),
            other => return Err(TemplateError::UnknownOperation(other.to_string())),
        };
        Ok(op)
    }

    /// The wire name of this operation.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::CreateUser(_) => "create_user",
            Self::AlterUserPassword(_) => "alter_user_password",
            Self::DropUser(_) => "drop_user",
            Self::CreateRole(_) => "create_role",
            Self::DropRole(_) => "drop_role",
            Self::GrantRole(_) => "grant_role",
            Self::RevokeRole(_) => "revoke_role",
            Self::SetDefaultRoles(_) => "set_default_roles",
            Self::GrantPrivilege(_) => "grant_privilege",
            Self::RevokePrivilege(_) => "revoke_privilege",
            Self::CreateSettingsProfile(_) => "create_settings_profile",
            Self::AlterSettingsProfile(_) => "alter_settings_profile",
            Self::DropSettingsProfile(_) => "drop_settings_profile",
            Self::AssignSettingsProfile(_) => "assign_settings_profile",
            Self::CreateQuota(_) => "create_quota",
            Self::AlterQuota(_) => "alter_quota",
            Self::DropQuota(_) => "drop_quota",
            Self::AssignQuota(_) => "assign_quota",
            Self::CreateRowPolicy(_) => "create_row_policy",
            Self::AlterRowPolicy(_) => "alter_row_policy",
            Self::DropRowPolicy(_) => "drop_row_policy",
        }
    }
}
