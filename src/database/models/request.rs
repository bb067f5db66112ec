use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::auth::Identity;
use crate::vault::{Disclosure, PasswordHash, Secret};

/// Maximum length of a requested database name (PostgreSQL identifier limit).
pub const MAX_DB_NAME_LENGTH: usize = 63;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(format!("unknown status '{}'", other)),
        }
    }
}

/// Backing resources and credentials of an approved request.
#[derive(Debug, Clone)]
pub struct ProvisionedDatabase {
    pub database: String,
    pub db_user: String,
    pub password_hash: PasswordHash,
    pub disclosure: Disclosure,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum RequestState {
    Pending,
    Approved(ProvisionedDatabase),
    Rejected {
        rejected_by: String,
        rejected_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone)]
pub struct ProvisioningRequest {
    pub id: Uuid,
    pub owner_id: i64,
    pub owner_username: String,
    pub tenant_id: String,
    pub db_name: String,
    pub state: RequestState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisioningRequest {
    pub fn status(&self) -> RequestStatus {
        match self.state {
            RequestState::Pending => RequestStatus::Pending,
            RequestState::Approved(_) => RequestStatus::Approved,
            RequestState::Rejected { .. } => RequestStatus::Rejected,
        }
    }

    pub fn provisioned(&self) -> Option<&ProvisionedDatabase> {
        match &self.state {
            RequestState::Approved(provisioned) => Some(provisioned),
            _ => None,
        }
    }

    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        self.owner_id == identity.user_id && self.tenant_id == identity.tenant_id
    }

    pub fn view(&self) -> RequestView {
        let provisioned = self.provisioned();
        let (decided_by, decided_at) = match &self.state {
            RequestState::Pending => (None, None),
            RequestState::Approved(p) => (Some(p.approved_by.clone()), Some(p.approved_at)),
            RequestState::Rejected { rejected_by, rejected_at } => {
                (Some(rejected_by.clone()), Some(*rejected_at))
            }
        };

        RequestView {
            id: self.id,
            student_id: self.owner_id,
            student_username: self.owner_username.clone(),
            tenant_id: self.tenant_id.clone(),
            db_name: self.db_name.clone(),
            status: self.status(),
            db_user: provisioned.map(|p| p.db_user.clone()),
            database: provisioned.map(|p| p.database.clone()),
            password_viewable: provisioned.map_or(false, |p| p.disclosure.is_available()),
            decided_by,
            decided_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Fields supplied when a request is created.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub id: Uuid,
    pub owner_id: i64,
    pub owner_username: String,
    pub tenant_id: String,
    pub db_name: String,
}

/// Public representation of a request. Never carries the hash or the plaintext.
#[derive(Debug, Clone, Serialize)]
pub struct RequestView {
    pub id: Uuid,
    pub student_id: i64,
    pub student_username: String,
    pub tenant_id: String,
    pub db_name: String,
    pub status: RequestStatus,
    pub db_user: Option<String>,
    pub database: Option<String>,
    pub password_viewable: bool,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Flat row of the `database_requests` table.
#[derive(Debug, Clone, FromRow)]
pub struct DatabaseRequestRow {
    pub id: Uuid,
    pub owner_id: i64,
    pub owner_username: String,
    pub tenant_id: String,
    pub db_name: String,
    pub status: String,
    pub database_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password_hash: Option<String>,
    pub db_password_plaintext: Option<String>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
#[error("request {id} is inconsistent: {reason}")]
pub struct InconsistentRecord {
    pub id: Uuid,
    pub reason: String,
}

impl TryFrom<DatabaseRequestRow> for ProvisioningRequest {
    type Error = InconsistentRecord;

    fn try_from(row: DatabaseRequestRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let inconsistent = |reason: &str| InconsistentRecord { id, reason: reason.to_string() };

        let status: RequestStatus = row.status.parse().map_err(|e: String| inconsistent(&e))?;

        let state = match status {
            RequestStatus::Pending => {
                if row.db_password_plaintext.is_some() {
                    return Err(inconsistent("pending request holds a plaintext password"));
                }
                RequestState::Pending
            }
            RequestStatus::Rejected => {
                if row.db_password_plaintext.is_some() {
                    return Err(inconsistent("rejected request holds a plaintext password"));
                }
                RequestState::Rejected {
                    rejected_by: row.decided_by.ok_or_else(|| inconsistent("missing decided_by"))?,
                    rejected_at: row.decided_at.ok_or_else(|| inconsistent("missing decided_at"))?,
                }
            }
            RequestStatus::Approved => {
                let stored_hash = row
                    .db_password_hash
                    .ok_or_else(|| inconsistent("missing password hash"))?;
                RequestState::Approved(ProvisionedDatabase {
                    database: row.database_name.ok_or_else(|| inconsistent("missing database name"))?,
                    db_user: row.db_user.ok_or_else(|| inconsistent("missing db_user"))?,
                    password_hash: PasswordHash::from_stored(stored_hash)
                        .map_err(|e| inconsistent(&e.to_string()))?,
                    disclosure: match row.db_password_plaintext {
                        Some(plaintext) => Disclosure::Undisclosed(Secret::new(plaintext)),
                        None => Disclosure::Disclosed,
                    },
                    approved_by: row.decided_by.ok_or_else(|| inconsistent("missing decided_by"))?,
                    approved_at: row.decided_at.ok_or_else(|| inconsistent("missing decided_at"))?,
                })
            }
        };

        Ok(Self {
            id,
            owner_id: row.owner_id,
            owner_username: row.owner_username,
            tenant_id: row.tenant_id,
            db_name: row.db_name,
            state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Checks a requested database name: 1-63 characters from `[a-z0-9-]`.
pub fn validate_db_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Database name cannot be empty".to_string());
    }
    if name.len() > MAX_DB_NAME_LENGTH {
        return Err(format!("Database name must be at most {} characters", MAX_DB_NAME_LENGTH));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return Err("Database name can only contain lowercase letters, digits and hyphens".to_string());
    }
    Ok(())
}
