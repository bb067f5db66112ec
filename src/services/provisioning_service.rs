use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::database::models::{
    validate_db_name, NewRequest, ProvisionedDatabase, ProvisioningRequest, RequestState, RequestStatus,
};
use crate::database::provisioner::{ClusterError, ClusterNames, Provisioner};
use crate::database::repository::{RequestDirectory, RequestLock, StoreError, TenantScope};
use crate::vault::{CredentialVault, Disclosure, Secret, VaultError};

#[derive(Debug, Error)]
pub enum ProvisioningError {
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("Request {0} not found")]
    NotFound(Uuid),

    #[error("Invalid database name: {0}")]
    InvalidName(String),

    #[error("A database named '{0}' has already been requested")]
    DuplicateName(String),

    #[error("Request limit reached: at most {limit} requests per user")]
    QuotaExceeded { limit: i64 },

    #[error("Request has already been {0}")]
    AlreadyDecided(RequestStatus),

    #[error("Password has already been revealed")]
    AlreadyRevealed,

    #[error("Request is {0}, no database has been provisioned")]
    NotProvisioned(RequestStatus),

    #[error("Weak password: {0}")]
    WeakPassword(#[source] VaultError),

    #[error("Credential handling failed")]
    Credentials(#[source] VaultError),

    #[error("Database provisioning failed")]
    ProvisioningFailed(#[source] ClusterError),

    #[error("Database server unreachable")]
    Unreachable(#[source] ClusterError),

    #[error("Authentication failed for the database user")]
    AuthFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where revealed credentials can be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
}

/// Credentials returned by the single successful reveal of a request.
#[derive(Debug, Serialize)]
pub struct RevealedCredentials {
    pub db_name: String,
    pub db_user: String,
    pub database: String,
    #[serde(rename = "db_password")]
    pub password: Secret,
    pub host: String,
    pub port: u16,
}

/// Request state machine: creation under quota, approval with cluster provisioning,
/// one-time disclosure, password rotation and removal.
pub struct ProvisioningService {
    directory: Arc<dyn RequestDirectory>,
    provisioner: Arc<dyn Provisioner>,
    vault: CredentialVault,
    quota: i64,
    connection: ConnectionInfo,
}

impl ProvisioningService {
    pub fn new(
        directory: Arc<dyn RequestDirectory>,
        provisioner: Arc<dyn Provisioner>,
        vault: CredentialVault,
        quota: i64,
        connection: ConnectionInfo,
    ) -> Self {
        Self {
            directory,
            provisioner,
            vault,
            quota,
            connection,
        }
    }

    pub async fn create(&self, caller: &Identity, db_name: &str) -> Result<ProvisioningRequest, ProvisioningError> {
        validate_db_name(db_name).map_err(ProvisioningError::InvalidName)?;

        let new_request = NewRequest {
            id: Uuid::new_v4(),
            owner_id: caller.user_id,
            owner_username: caller.username.clone(),
            tenant_id: caller.tenant_id.clone(),
            db_name: db_name.to_string(),
        };

        let request = self
            .directory
            .create(new_request, self.quota)
            .await
            .map_err(|e| match e {
                StoreError::Duplicate => ProvisioningError::DuplicateName(db_name.to_string()),
                StoreError::QuotaExceeded { limit } => ProvisioningError::QuotaExceeded { limit },
                other => ProvisioningError::Store(other),
            })?;

        info!(
            request_id = %request.id,
            tenant = %request.tenant_id,
            actor = %caller.username,
            "Database request {} created",
            request.db_name
        );
        Ok(request)
    }

    pub async fn list_mine(&self, caller: &Identity) -> Result<Vec<ProvisioningRequest>, ProvisioningError> {
        Ok(self
            .directory
            .list_by_owner(caller.user_id, &caller.tenant_id)
            .await?)
    }

    pub async fn list_pending(&self, caller: &Identity) -> Result<Vec<ProvisioningRequest>, ProvisioningError> {
        if !caller.role.is_approver() {
            return Err(ProvisioningError::Forbidden("Only administrators can review requests"));
        }
        let scope = if caller.role.spans_tenants() {
            TenantScope::All
        } else {
            TenantScope::Tenant(caller.tenant_id.clone())
        };
        Ok(self.directory.list_pending(&scope).await?)
    }

    pub async fn approve(&self, id: Uuid, caller: &Identity) -> Result<ProvisioningRequest, ProvisioningError> {
        if !caller.role.is_approver() {
            return Err(ProvisioningError::Forbidden("Only administrators can approve requests"));
        }

        let guard = self.lock(id).await?;
        let record = guard.record();
        if !caller.administers(&record.tenant_id) {
            return Err(ProvisioningError::Forbidden("Request belongs to another tenant"));
        }
        if !matches!(record.state, RequestState::Pending) {
            return Err(ProvisioningError::AlreadyDecided(record.status()));
        }

        let names = ClusterNames::derive(&record.tenant_id, &record.db_name)
            .map_err(ProvisioningError::ProvisioningFailed)?;
        let password = self.vault.generate_password();
        let password_hash = self.vault.hash(&password).map_err(ProvisioningError::Credentials)?;

        if let Err(e) = self.provisioner.create(&names, &password).await {
            error!(request_id = %id, "Provisioning {} failed: {}", names.database, e);
            self.rollback(id, &names).await;
            return Err(ProvisioningError::ProvisioningFailed(e));
        }

        let provisioned = ProvisionedDatabase {
            database: names.database.clone(),
            db_user: names.role.clone(),
            password_hash,
            disclosure: Disclosure::Undisclosed(password),
            approved_by: caller.username.clone(),
            approved_at: Utc::now(),
        };

        match guard.approve(provisioned).await {
            Ok(approved) => {
                info!(
                    request_id = %id,
                    tenant = %approved.tenant_id,
                    actor = %caller.username,
                    "Approved database request {} as {}",
                    approved.db_name,
                    names.database
                );
                Ok(approved)
            }
            Err(e) => {
                error!(request_id = %id, "Recording approval failed: {}", e);
                self.rollback(id, &names).await;
                Err(e.into())
            }
        }
    }

    pub async fn reject(&self, id: Uuid, caller: &Identity) -> Result<ProvisioningRequest, ProvisioningError> {
        if !caller.role.is_approver() {
            return Err(ProvisioningError::Forbidden("Only administrators can reject requests"));
        }

        let guard = self.lock(id).await?;
        let record = guard.record();
        if !caller.administers(&record.tenant_id) {
            return Err(ProvisioningError::Forbidden("Request belongs to another tenant"));
        }
        if !matches!(record.state, RequestState::Pending) {
            return Err(ProvisioningError::AlreadyDecided(record.status()));
        }

        let rejected = guard.reject(caller.username.clone(), Utc::now()).await?;
        info!(
            request_id = %id,
            tenant = %rejected.tenant_id,
            actor = %caller.username,
            "Rejected database request {}",
            rejected.db_name
        );
        Ok(rejected)
    }

    /// Returns the plaintext password once. The slot is cleared in the same
    /// transaction, so a second or concurrent reveal fails.
    pub async fn reveal(&self, id: Uuid, caller: &Identity) -> Result<RevealedCredentials, ProvisioningError> {
        let guard = self.owned_lock(id, caller).await?;
        let record = guard.record();

        let provisioned = match &record.state {
            RequestState::Approved(provisioned) => provisioned,
            _ => return Err(ProvisioningError::NotProvisioned(record.status())),
        };
        let mut disclosure = provisioned.disclosure.clone();
        let password = disclosure.take().ok_or(ProvisioningError::AlreadyRevealed)?;

        let credentials = RevealedCredentials {
            db_name: record.db_name.clone(),
            db_user: provisioned.db_user.clone(),
            database: provisioned.database.clone(),
            password,
            host: self.connection.host.clone(),
            port: self.connection.port,
        };
        let password_hash = provisioned.password_hash.clone();

        guard.update_credentials(password_hash, disclosure).await?;

        info!(request_id = %id, actor = %caller.username, "Revealed credentials for {}", credentials.database);
        Ok(credentials)
    }

    /// Rotates the role password. A request whose password was never revealed
    /// keeps offering a one-time reveal, now of the new password.
    pub async fn change_password(
        &self,
        id: Uuid,
        caller: &Identity,
        new_password: Secret,
    ) -> Result<ProvisioningRequest, ProvisioningError> {
        let guard = self.owned_lock(id, caller).await?;
        let record = guard.record();

        let provisioned = match &record.state {
            RequestState::Approved(provisioned) => provisioned,
            _ => return Err(ProvisioningError::NotProvisioned(record.status())),
        };
        self.vault
            .validate(new_password.expose())
            .map_err(ProvisioningError::WeakPassword)?;
        let password_hash = self
            .vault
            .hash(&new_password)
            .map_err(ProvisioningError::Credentials)?;

        self.provisioner
            .set_password(&provisioned.db_user, &new_password)
            .await
            .map_err(|e| {
                error!(request_id = %id, "Password rotation for {} failed: {}", provisioned.db_user, e);
                ProvisioningError::ProvisioningFailed(e)
            })?;

        let disclosure = match provisioned.disclosure {
            Disclosure::Undisclosed(_) => Disclosure::Undisclosed(new_password),
            Disclosure::Disclosed => Disclosure::Disclosed,
        };
        let db_user = provisioned.db_user.clone();

        let updated = guard
            .update_credentials(password_hash, disclosure)
            .await
            .map_err(|e| {
                // The role already carries the new password at this point
                error!(request_id = %id, "Recording new password for {} failed: {}", db_user, e);
                e
            })?;

        info!(request_id = %id, actor = %caller.username, "Changed password for {}", db_user);
        Ok(updated)
    }

    /// Removes a request after dropping its database and role; if the drop fails
    /// the record is kept. Requests that were never approved drop the names an
    /// approval would have used, clearing leftovers of an interrupted approval.
    pub async fn delete(&self, id: Uuid, caller: &Identity) -> Result<(), ProvisioningError> {
        let guard = self.owned_lock(id, caller).await?;

        let record = guard.record();
        let names = match record.provisioned() {
            Some(provisioned) => ClusterNames {
                database: provisioned.database.clone(),
                role: provisioned.db_user.clone(),
            },
            None => ClusterNames::derive(&record.tenant_id, &record.db_name)
                .map_err(ProvisioningError::ProvisioningFailed)?,
        };
        self.provisioner.teardown(&names).await.map_err(|e| {
            error!(request_id = %id, "Dropping {} failed: {}", names.database, e);
            ProvisioningError::ProvisioningFailed(e)
        })?;

        let db_name = guard.record().db_name.clone();
        guard.remove().await?;

        info!(request_id = %id, actor = %caller.username, "Deleted database request {}", db_name);
        Ok(())
    }

    async fn lock(&self, id: Uuid) -> Result<Box<dyn RequestLock>, ProvisioningError> {
        self.directory
            .lock(id)
            .await?
            .ok_or(ProvisioningError::NotFound(id))
    }

    async fn owned_lock(&self, id: Uuid, caller: &Identity) -> Result<Box<dyn RequestLock>, ProvisioningError> {
        let guard = self.lock(id).await?;
        if !guard.record().is_owned_by(caller) {
            return Err(ProvisioningError::Forbidden("Only the owner can manage this request"));
        }
        Ok(guard)
    }

    async fn rollback(&self, id: Uuid, names: &ClusterNames) {
        if let Err(e) = self.provisioner.teardown(names).await {
            warn!(request_id = %id, "Rolling back {} failed: {}", names.database, e);
        }
    }
}
