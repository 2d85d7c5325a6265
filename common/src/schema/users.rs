use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Tipster,
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "USER" => Ok(Role::User),
            "TIPSTER" => Ok(Role::Tipster),
            other => Err(ValidationError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => f.write_str("USER"),
            Role::Tipster => f.write_str("TIPSTER"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Pending => f.write_str("PENDING"),
            UserStatus::Approved => f.write_str("APPROVED"),
            UserStatus::Rejected => f.write_str("REJECTED"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub role: Role,
    pub status: UserStatus,
    pub requested_role: Option<Role>,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

impl User {
    pub fn display_name(&self) -> String {
        match &self.username {
            Some(name) => name.clone(),
            None => format!("ID {}", self.telegram_id),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == UserStatus::Approved
    }

    pub fn is_tipster(&self) -> bool {
        self.role == Role::Tipster
    }
}

/// Outcome of an idempotent registration.
#[derive(Debug, Clone, Serialize)]
pub struct Registration {
    pub user: User,
    pub created: bool,
}
