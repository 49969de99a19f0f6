use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{role_grants, Capability};

/// Staff role carried in tokens and used for access decisions.
///
/// French aliases are accepted on input so legacy payloads (`medecin`,
/// `secretaire`, ...) still deserialize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "administrateur")]
    Admin,

    #[serde(alias = "medecin", alias = "médecin")]
    Doctor,

    #[serde(alias = "infirmier", alias = "infirmiere", alias = "infirmière")]
    Nurse,

    #[serde(alias = "secretaire", alias = "secrétaire")]
    Secretary,

    #[serde(alias = "pharmacien")]
    Pharmacist,

    #[serde(alias = "technicien")]
    Technician,
}

impl Role {
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Doctor,
        Role::Nurse,
        Role::Secretary,
        Role::Pharmacist,
        Role::Technician,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Secretary => "secretary",
            Role::Pharmacist => "pharmacist",
            Role::Technician => "technician",
        }
    }

    /// Roles allowed to run consultations.
    pub fn is_clinical(&self) -> bool {
        matches!(self, Role::Doctor | Role::Nurse)
    }

    pub fn can(&self, capability: Capability) -> bool {
        role_grants(*self, capability)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
            .map_err(|_| format!("unknown role: {}", value))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub iat: Option<u64>,
}

/// Verified identity attached to every authenticated request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: Option<String>,
    pub role: Role,
    pub issued_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}
