use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::database::inspector::{ConnectTarget, DatabaseSize, Inspector};
use crate::database::models::{ProvisionedDatabase, ProvisioningRequest};
use crate::database::provisioner::ClusterError;
use crate::database::repository::RequestDirectory;
use crate::services::provisioning_service::ProvisioningError;
use crate::vault::Secret;

/// Size and table listings of provisioned databases, for owners and tenant admins.
pub struct InspectionService {
    directory: Arc<dyn RequestDirectory>,
    inspector: Arc<dyn Inspector>,
}

impl InspectionService {
    pub fn new(directory: Arc<dyn RequestDirectory>, inspector: Arc<dyn Inspector>) -> Self {
        Self { directory, inspector }
    }

    pub async fn size(&self, id: Uuid, caller: &Identity) -> Result<DatabaseSize, ProvisioningError> {
        let request = self.visible_request(id, caller).await?;
        let provisioned = provisioned(&request)?;

        self.inspector
            .database_size(&provisioned.database)
            .await
            .map_err(|e| {
                warn!(request_id = %id, "Reading size of {} failed: {}", provisioned.database, e);
                ProvisioningError::Unreachable(e)
            })
    }

    /// Lists tables over a live connection authenticated with `password`, so a
    /// successful listing proves the caller knows the role's current password.
    pub async fn tables(&self, id: Uuid, caller: &Identity, password: Secret) -> Result<Vec<String>, ProvisioningError> {
        let request = self.visible_request(id, caller).await?;
        let provisioned = provisioned(&request)?;

        if password.is_empty() {
            return Err(ProvisioningError::AuthFailed);
        }

        let target = ConnectTarget {
            database: provisioned.database.clone(),
            user: provisioned.db_user.clone(),
            password,
        };
        match self.inspector.list_tables(target).await {
            Ok(tables) => {
                info!(request_id = %id, actor = %caller.username, "Listed {} tables in {}", tables.len(), provisioned.database);
                Ok(tables)
            }
            Err(ClusterError::AuthFailed(user)) => {
                info!(request_id = %id, actor = %caller.username, "Live authentication as {} failed", user);
                Err(ProvisioningError::AuthFailed)
            }
            Err(e) => {
                warn!(request_id = %id, "Listing tables of {} failed: {}", provisioned.database, e);
                Err(ProvisioningError::Unreachable(e))
            }
        }
    }

    async fn visible_request(&self, id: Uuid, caller: &Identity) -> Result<ProvisioningRequest, ProvisioningError> {
        let request = self
            .directory
            .find(id)
            .await?
            .ok_or(ProvisioningError::NotFound(id))?;

        if !request.is_owned_by(caller) && !caller.administers(&request.tenant_id) {
            return Err(ProvisioningError::Forbidden("Not allowed to inspect this database"));
        }
        Ok(request)
    }
}

fn provisioned(request: &ProvisioningRequest) -> Result<&ProvisionedDatabase, ProvisioningError> {
    request
        .provisioned()
        .ok_or(ProvisioningError::NotProvisioned(request.status()))
}
