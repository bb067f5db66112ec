//! Durable store of provisioning requests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::error::ErrorKind;
use sqlx::{PgPool, Postgres, Transaction};
use thiserror::Error;
use uuid::Uuid;

use crate::database::models::request::InconsistentRecord;
use crate::database::models::{DatabaseRequestRow, NewRequest, ProvisionedDatabase, ProvisioningRequest};
use crate::vault::{Disclosure, PasswordHash};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request already exists")]
    Duplicate,

    #[error("owner already holds {limit} requests")]
    QuotaExceeded { limit: i64 },

    #[error(transparent)]
    Inconsistent(#[from] InconsistentRecord),

    #[error("storage error")]
    Sql(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match error.as_database_error().map(|e| e.kind()) {
            Some(ErrorKind::UniqueViolation) => Self::Duplicate,
            _ => Self::Sql(error),
        }
    }
}

/// Which tenants a pending listing covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantScope {
    Tenant(String),
    All,
}

#[async_trait]
pub trait RequestDirectory: Send + Sync {
    /// Inserts a pending request unless the owner already holds `quota` requests
    /// of any status. The quota check and insert are atomic per owner.
    async fn create(&self, request: NewRequest, quota: i64) -> Result<ProvisioningRequest, StoreError>;

    async fn find(&self, id: Uuid) -> Result<Option<ProvisioningRequest>, StoreError>;

    /// All requests of an owner within its tenant, newest first.
    async fn list_by_owner(&self, owner_id: i64, tenant_id: &str) -> Result<Vec<ProvisioningRequest>, StoreError>;

    /// Pending requests in scope, oldest first.
    async fn list_pending(&self, scope: &TenantScope) -> Result<Vec<ProvisioningRequest>, StoreError>;

    /// Locks a request for a state transition. Concurrent lockers of the same id
    /// wait until the holder commits or drops its lock. Dropping a lock without
    /// calling one of its consuming methods discards the transition.
    async fn lock(&self, id: Uuid) -> Result<Option<Box<dyn RequestLock>>, StoreError>;
}

#[async_trait]
pub trait RequestLock: Send {
    fn record(&self) -> &ProvisioningRequest;

    async fn approve(self: Box<Self>, provisioned: ProvisionedDatabase) -> Result<ProvisioningRequest, StoreError>;

    async fn reject(
        self: Box<Self>,
        rejected_by: String,
        rejected_at: DateTime<Utc>,
    ) -> Result<ProvisioningRequest, StoreError>;

    /// Rewrites the credential columns of an approved request.
    async fn update_credentials(
        self: Box<Self>,
        password_hash: PasswordHash,
        disclosure: Disclosure,
    ) -> Result<ProvisioningRequest, StoreError>;

    async fn remove(self: Box<Self>) -> Result<(), StoreError>;
}

const SELECT_COLUMNS: &str = r#"
    id, owner_id, owner_username, tenant_id, db_name, status,
    database_name, db_user, db_password_hash, db_password_plaintext,
    decided_by, decided_at, created_at, updated_at
"#;

/// PostgreSQL-backed request directory.
#[derive(Debug, Clone)]
pub struct PgRequestDirectory {
    pool: PgPool,
}

impl PgRequestDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_requests(rows: Vec<DatabaseRequestRow>) -> Result<Vec<ProvisioningRequest>, StoreError> {
    rows.into_iter()
        .map(|row| ProvisioningRequest::try_from(row).map_err(StoreError::from))
        .collect()
}

#[async_trait]
impl RequestDirectory for PgRequestDirectory {
    async fn create(&self, request: NewRequest, quota: i64) -> Result<ProvisioningRequest, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Serialise creates per owner so the count below cannot go stale
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("nidhi-quota:{}:{}", request.tenant_id, request.owner_id))
            .execute(&mut *tx)
            .await?;

        let (held,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM database_requests WHERE owner_id = $1 AND tenant_id = $2",
        )
        .bind(request.owner_id)
        .bind(&request.tenant_id)
        .fetch_one(&mut *tx)
        .await?;

        if held >= quota {
            return Err(StoreError::QuotaExceeded { limit: quota });
        }

        let query = format!(
            r#"
            INSERT INTO database_requests (id, owner_id, owner_username, tenant_id, db_name, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(request.id)
            .bind(request.owner_id)
            .bind(&request.owner_username)
            .bind(&request.tenant_id)
            .bind(&request.db_name)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ProvisioningRequest::try_from(row)?)
    }

    async fn find(&self, id: Uuid) -> Result<Option<ProvisioningRequest>, StoreError> {
        let query = format!("SELECT {} FROM database_requests WHERE id = $1", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(ProvisioningRequest::try_from)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn list_by_owner(&self, owner_id: i64, tenant_id: &str) -> Result<Vec<ProvisioningRequest>, StoreError> {
        let query = format!(
            "SELECT {} FROM database_requests WHERE owner_id = $1 AND tenant_id = $2 ORDER BY created_at DESC",
            SELECT_COLUMNS
        );
        let rows = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(owner_id)
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;

        into_requests(rows)
    }

    async fn list_pending(&self, scope: &TenantScope) -> Result<Vec<ProvisioningRequest>, StoreError> {
        let rows = match scope {
            TenantScope::Tenant(tenant_id) => {
                let query = format!(
                    "SELECT {} FROM database_requests WHERE status = 'pending' AND tenant_id = $1 ORDER BY created_at ASC",
                    SELECT_COLUMNS
                );
                sqlx::query_as::<_, DatabaseRequestRow>(&query)
                    .bind(tenant_id)
                    .fetch_all(&self.pool)
                    .await?
            }
            TenantScope::All => {
                let query = format!(
                    "SELECT {} FROM database_requests WHERE status = 'pending' ORDER BY created_at ASC",
                    SELECT_COLUMNS
                );
                sqlx::query_as::<_, DatabaseRequestRow>(&query)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        into_requests(rows)
    }

    async fn lock(&self, id: Uuid) -> Result<Option<Box<dyn RequestLock>>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let query = format!("SELECT {} FROM database_requests WHERE id = $1 FOR UPDATE", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        match row {
            Some(row) => {
                let record = ProvisioningRequest::try_from(row)?;
                Ok(Some(Box::new(PgRequestLock { tx, record })))
            }
            None => Ok(None),
        }
    }
}

/// Row lock held as an open transaction; dropping it rolls back.
struct PgRequestLock {
    tx: Transaction<'static, Postgres>,
    record: ProvisioningRequest,
}

impl PgRequestLock {
    async fn finish(self, row: DatabaseRequestRow) -> Result<ProvisioningRequest, StoreError> {
        self.tx.commit().await?;
        Ok(ProvisioningRequest::try_from(row)?)
    }
}

#[async_trait]
impl RequestLock for PgRequestLock {
    fn record(&self) -> &ProvisioningRequest {
        &self.record
    }

    async fn approve(mut self: Box<Self>, provisioned: ProvisionedDatabase) -> Result<ProvisioningRequest, StoreError> {
        let query = format!(
            r#"
            UPDATE database_requests
            SET status = 'approved',
                database_name = $2,
                db_user = $3,
                db_password_hash = $4,
                db_password_plaintext = $5,
                decided_by = $6,
                decided_at = $7,
                updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(self.record.id)
            .bind(&provisioned.database)
            .bind(&provisioned.db_user)
            .bind(provisioned.password_hash.as_stored())
            .bind(provisioned.disclosure.plaintext().map(|s| s.expose()))
            .bind(&provisioned.approved_by)
            .bind(provisioned.approved_at)
            .fetch_one(&mut *self.tx)
            .await?;

        (*self).finish(row).await
    }

    async fn reject(
        mut self: Box<Self>,
        rejected_by: String,
        rejected_at: DateTime<Utc>,
    ) -> Result<ProvisioningRequest, StoreError> {
        let query = format!(
            r#"
            UPDATE database_requests
            SET status = 'rejected', decided_by = $2, decided_at = $3, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(self.record.id)
            .bind(&rejected_by)
            .bind(rejected_at)
            .fetch_one(&mut *self.tx)
            .await?;

        (*self).finish(row).await
    }

    async fn update_credentials(
        mut self: Box<Self>,
        password_hash: PasswordHash,
        disclosure: Disclosure,
    ) -> Result<ProvisioningRequest, StoreError> {
        let query = format!(
            r#"
            UPDATE database_requests
            SET db_password_hash = $2, db_password_plaintext = $3, updated_at = now()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        );
        let row = sqlx::query_as::<_, DatabaseRequestRow>(&query)
            .bind(self.record.id)
            .bind(password_hash.as_stored())
            .bind(disclosure.plaintext().map(|s| s.expose()))
            .fetch_one(&mut *self.tx)
            .await?;

        (*self).finish(row).await
    }

    async fn remove(mut self: Box<Self>) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM database_requests WHERE id = $1")
            .bind(self.record.id)
            .execute(&mut *self.tx)
            .await?;

        self.tx.commit().await?;
        Ok(())
    }
}
