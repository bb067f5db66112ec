//! Role and database DDL on the provisioning cluster.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::database::manager::{is_valid_identifier, quote_identifier, quote_literal};
use crate::vault::Secret;

/// Longest prefix of the requested name kept in physical names; leaves room for
/// the hash and the `_user` suffix within the 63-byte identifier limit.
const NAME_PREFIX_LENGTH: usize = 40;
const NAME_HASH_LENGTH: usize = 10;

#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("invalid cluster identifier '{0}'")]
    InvalidIdentifier(String),

    #[error("authentication failed for role '{0}'")]
    AuthFailed(String),

    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    #[error("cluster statement failed: {0}")]
    Statement(#[from] sqlx::Error),
}

/// Physical database and role names backing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterNames {
    pub database: String,
    pub role: String,
}

impl ClusterNames {
    /// Derives names unique per (tenant, requested name): the sanitized request name
    /// followed by a short hash of the pair.
    pub fn derive(tenant_id: &str, db_name: &str) -> Result<Self, ClusterError> {
        let base: String = db_name
            .chars()
            .map(|c| if c == '-' { '_' } else { c })
            .take(NAME_PREFIX_LENGTH)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(tenant_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(db_name.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        let suffix = &digest[..NAME_HASH_LENGTH];

        let names = Self {
            database: format!("{}_{}", base, suffix),
            role: format!("{}_{}_user", base, suffix),
        };
        names.validate()?;
        Ok(names)
    }

    pub fn validate(&self) -> Result<(), ClusterError> {
        for name in [&self.database, &self.role] {
            if !is_valid_identifier(name) {
                return Err(ClusterError::InvalidIdentifier(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates (or re-passwords) the login role, then creates the database owned by
    /// it unless it already exists. Safe to repeat for the same names.
    async fn create(&self, names: &ClusterNames, password: &Secret) -> Result<(), ClusterError>;

    async fn set_password(&self, role: &str, password: &Secret) -> Result<(), ClusterError>;

    /// Drops the database and the role if they exist.
    async fn teardown(&self, names: &ClusterNames) -> Result<(), ClusterError>;
}

/// Provisioner backed by the cluster admin pool.
#[derive(Debug, Clone)]
pub struct PgProvisioner {
    pool: PgPool,
}

impl PgProvisioner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn role_exists(&self, role: &str) -> Result<bool, ClusterError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_roles WHERE rolname = $1)")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn database_exists(&self, database: &str) -> Result<bool, ClusterError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
                .bind(database)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn execute(&self, statement: &str) -> Result<(), ClusterError> {
        sqlx::query(statement).execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for PgProvisioner {
    async fn create(&self, names: &ClusterNames, password: &Secret) -> Result<(), ClusterError> {
        names.validate()?;
        let role = quote_identifier(&names.role);
        let database = quote_identifier(&names.database);
        let password = quote_literal(password.expose());

        if self.role_exists(&names.role).await? {
            debug!("Role {} already exists, resetting password", names.role);
            self.execute(&format!("ALTER ROLE {} WITH LOGIN PASSWORD {}", role, password))
                .await?;
        } else {
            self.execute(&format!("CREATE ROLE {} WITH LOGIN PASSWORD {}", role, password))
                .await?;
        }

        if self.database_exists(&names.database).await? {
            debug!("Database {} already exists, reusing it", names.database);
            self.execute(&format!("ALTER DATABASE {} OWNER TO {}", database, role))
                .await?;
        } else {
            self.execute(&format!("CREATE DATABASE {} OWNER {}", database, role))
                .await?;
        }

        self.execute(&format!("REVOKE ALL ON DATABASE {} FROM PUBLIC", database))
            .await?;
        self.execute(&format!("GRANT ALL PRIVILEGES ON DATABASE {} TO {}", database, role))
            .await?;

        info!("Provisioned database {} for role {}", names.database, names.role);
        Ok(())
    }

    async fn set_password(&self, role: &str, password: &Secret) -> Result<(), ClusterError> {
        if !is_valid_identifier(role) {
            return Err(ClusterError::InvalidIdentifier(role.to_string()));
        }
        self.execute(&format!(
            "ALTER ROLE {} WITH PASSWORD {}",
            quote_identifier(role),
            quote_literal(password.expose())
        ))
        .await?;

        info!("Rotated password for role {}", role);
        Ok(())
    }

    async fn teardown(&self, names: &ClusterNames) -> Result<(), ClusterError> {
        names.validate()?;

        let terminated: Vec<i32> = sqlx::query_scalar(
            "SELECT pid FROM pg_stat_activity WHERE datname = $1 AND pid <> pg_backend_pid()",
        )
        .bind(&names.database)
        .fetch_all(&self.pool)
        .await?;
        for pid in &terminated {
            if let Err(e) = sqlx::query("SELECT pg_terminate_backend($1)")
                .bind(pid)
                .execute(&self.pool)
                .await
            {
                warn!("Failed to terminate backend {} on {}: {}", pid, names.database, e);
            }
        }

        self.execute(&format!("DROP DATABASE IF EXISTS {}", quote_identifier(&names.database)))
            .await?;
        self.execute(&format!("DROP ROLE IF EXISTS {}", quote_identifier(&names.role)))
            .await?;

        info!("Dropped database {} and role {}", names.database, names.role);
        Ok(())
    }
}
