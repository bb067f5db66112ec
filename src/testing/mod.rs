//! In-memory stand-ins for the request directory and the provisioning cluster.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::auth::{Identity, Role};
use crate::database::inspector::{ConnectTarget, DatabaseSize, Inspector};
use crate::database::models::request::InconsistentRecord;
use crate::database::models::{NewRequest, ProvisionedDatabase, ProvisioningRequest, RequestState, RequestStatus};
use crate::database::provisioner::{ClusterError, ClusterNames, Provisioner};
use crate::database::repository::{RequestDirectory, RequestLock, StoreError, TenantScope};
use crate::vault::{Disclosure, PasswordHash};

pub fn identity(user_id: i64, username: &str, role: Role, tenant_id: &str) -> Identity {
    Identity {
        user_id,
        username: username.to_string(),
        role,
        tenant_id: tenant_id.to_string(),
    }
}

/// Request directory kept in insertion order. `lock` takes the whole directory,
/// which serialises transitions the way row locks do for a single request.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    records: Arc<Mutex<Vec<ProvisioningRequest>>>,
}

impl MemoryDirectory {
    pub async fn get(&self, id: Uuid) -> Option<ProvisioningRequest> {
        self.records.lock().await.iter().find(|r| r.id == id).cloned()
    }
}

#[async_trait]
impl RequestDirectory for MemoryDirectory {
    async fn create(&self, request: NewRequest, quota: i64) -> Result<ProvisioningRequest, StoreError> {
        let mut records = self.records.lock().await;

        let held = records
            .iter()
            .filter(|r| r.owner_id == request.owner_id && r.tenant_id == request.tenant_id)
            .count() as i64;
        if held >= quota {
            return Err(StoreError::QuotaExceeded { limit: quota });
        }
        if records
            .iter()
            .any(|r| r.tenant_id == request.tenant_id && r.db_name == request.db_name)
        {
            return Err(StoreError::Duplicate);
        }

        let now = Utc::now();
        let created = ProvisioningRequest {
            id: request.id,
            owner_id: request.owner_id,
            owner_username: request.owner_username,
            tenant_id: request.tenant_id,
            db_name: request.db_name,
            state: RequestState::Pending,
            created_at: now,
            updated_at: now,
        };
        records.push(created.clone());
        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ProvisioningRequest>, StoreError> {
        Ok(self.get(id).await)
    }

    async fn list_by_owner(&self, owner_id: i64, tenant_id: &str) -> Result<Vec<ProvisioningRequest>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.owner_id == owner_id && r.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn list_pending(&self, scope: &TenantScope) -> Result<Vec<ProvisioningRequest>, StoreError> {
        let records = self.records.lock().await;
        Ok(records
            .iter()
            .filter(|r| r.status() == RequestStatus::Pending)
            .filter(|r| match scope {
                TenantScope::Tenant(tenant_id) => &r.tenant_id == tenant_id,
                TenantScope::All => true,
            })
            .cloned()
            .collect())
    }

    async fn lock(&self, id: Uuid) -> Result<Option<Box<dyn RequestLock>>, StoreError> {
        let guard = self.records.clone().lock_owned().await;
        let record = guard.iter().find(|r| r.id == id).cloned();
        Ok(record.map(|record| Box::new(MemoryLock { guard, record }) as Box<dyn RequestLock>))
    }
}

struct MemoryLock {
    guard: OwnedMutexGuard<Vec<ProvisioningRequest>>,
    record: ProvisioningRequest,
}

impl MemoryLock {
    fn commit(mut self, state: RequestState) -> ProvisioningRequest {
        let mut updated = self.record.clone();
        updated.state = state;
        updated.updated_at = Utc::now();
        if let Some(slot) = self.guard.iter_mut().find(|r| r.id == updated.id) {
            *slot = updated.clone();
        }
        updated
    }
}

#[async_trait]
impl RequestLock for MemoryLock {
    fn record(&self) -> &ProvisioningRequest {
        &self.record
    }

    async fn approve(self: Box<Self>, provisioned: ProvisionedDatabase) -> Result<ProvisioningRequest, StoreError> {
        Ok((*self).commit(RequestState::Approved(provisioned)))
    }

    async fn reject(
        self: Box<Self>,
        rejected_by: String,
        rejected_at: DateTime<Utc>,
    ) -> Result<ProvisioningRequest, StoreError> {
        Ok((*self).commit(RequestState::Rejected { rejected_by, rejected_at }))
    }

    async fn update_credentials(
        self: Box<Self>,
        password_hash: PasswordHash,
        disclosure: Disclosure,
    ) -> Result<ProvisioningRequest, StoreError> {
        let mut provisioned = self
            .record
            .provisioned()
            .cloned()
            .ok_or_else(|| InconsistentRecord {
                id: self.record.id,
                reason: "credentials updated on a request without a database".to_string(),
            })?;
        provisioned.password_hash = password_hash;
        provisioned.disclosure = disclosure;
        Ok((*self).commit(RequestState::Approved(provisioned)))
    }

    async fn remove(mut self: Box<Self>) -> Result<(), StoreError> {
        let id = self.record.id;
        self.guard.retain(|r| r.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct ClusterState {
    roles: HashMap<String, String>,
    databases: HashMap<String, Vec<String>>,
}

/// Cluster that records roles with their passwords and databases with their tables.
#[derive(Default)]
pub struct MemoryCluster {
    state: StdMutex<ClusterState>,
}

impl MemoryCluster {
    pub fn has_role(&self, role: &str) -> bool {
        self.state.lock().unwrap().roles.contains_key(role)
    }

    pub fn role_password_is(&self, role: &str, password: &str) -> bool {
        self.state.lock().unwrap().roles.get(role).map(String::as_str) == Some(password)
    }

    pub fn add_table(&self, database: &str, table: &str) {
        if let Some(tables) = self.state.lock().unwrap().databases.get_mut(database) {
            tables.push(table.to_string());
        }
    }
}

#[async_trait]
impl Provisioner for MemoryCluster {
    async fn create(&self, names: &ClusterNames, password: &crate::vault::Secret) -> Result<(), ClusterError> {
        names.validate()?;
        let mut state = self.state.lock().unwrap();
        state.roles.insert(names.role.clone(), password.expose().to_string());
        state.databases.entry(names.database.clone()).or_default();
        Ok(())
    }

    async fn set_password(&self, role: &str, password: &crate::vault::Secret) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        match state.roles.get_mut(role) {
            Some(current) => {
                *current = password.expose().to_string();
                Ok(())
            }
            None => Err(ClusterError::InvalidIdentifier(role.to_string())),
        }
    }

    async fn teardown(&self, names: &ClusterNames) -> Result<(), ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.databases.remove(&names.database);
        state.roles.remove(&names.role);
        Ok(())
    }
}

#[async_trait]
impl Inspector for MemoryCluster {
    async fn database_size(&self, database: &str) -> Result<DatabaseSize, ClusterError> {
        let state = self.state.lock().unwrap();
        match state.databases.get(database) {
            Some(tables) => {
                let bytes = 7_500_000 + 8192 * tables.len() as i64;
                Ok(DatabaseSize {
                    bytes,
                    pretty: format!("{} kB", bytes / 1024),
                })
            }
            None => Err(ClusterError::Unreachable(format!("database \"{}\" does not exist", database))),
        }
    }

    async fn list_tables(&self, target: ConnectTarget) -> Result<Vec<String>, ClusterError> {
        let state = self.state.lock().unwrap();
        if state.roles.get(&target.user).map(String::as_str) != Some(target.password.expose()) {
            return Err(ClusterError::AuthFailed(target.user));
        }
        let mut tables = state
            .databases
            .get(&target.database)
            .cloned()
            .ok_or_else(|| ClusterError::Unreachable(format!("database \"{}\" does not exist", target.database)))?;
        tables.sort();
        Ok(tables)
    }
}
