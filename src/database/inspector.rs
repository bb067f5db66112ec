//! Read-only inspection of provisioned databases.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::postgres::PgConnectOptions;
use sqlx::{ConnectOptions, Connection, PgPool};
use tracing::debug;

use crate::database::manager::DatabaseManager;
use crate::database::provisioner::ClusterError;
use crate::vault::Secret;

/// SQLSTATE codes PostgreSQL reports for rejected credentials
const INVALID_PASSWORD: &str = "28P01";
const INVALID_AUTHORIZATION: &str = "28000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSize {
    pub bytes: i64,
    #[serde(rename = "size")]
    pub pretty: String,
}

/// Credentials for a live connection made on behalf of a student.
#[derive(Debug, Clone)]
pub struct ConnectTarget {
    pub database: String,
    pub user: String,
    pub password: Secret,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Inspector: Send + Sync {
    /// Size of `database`, read with the service's own credentials.
    async fn database_size(&self, database: &str) -> Result<DatabaseSize, ClusterError>;

    /// User-created tables, read over a connection authenticated with the target's
    /// credentials.
    async fn list_tables(&self, target: ConnectTarget) -> Result<Vec<String>, ClusterError>;
}

#[derive(Debug, Clone)]
pub struct PgInspector {
    manager: DatabaseManager,
    connect_timeout: Duration,
}

impl PgInspector {
    pub fn new(manager: DatabaseManager, connect_timeout: Duration) -> Self {
        Self { manager, connect_timeout }
    }

    fn admin_pool(&self) -> PgPool {
        self.manager.cluster_pool()
    }

    fn target_options(&self, target: &ConnectTarget) -> PgConnectOptions {
        self.manager
            .connect_options_as(&target.database, &target.user, target.password.expose())
            .disable_statement_logging()
    }
}

fn classify_connect_error(user: &str, error: sqlx::Error) -> ClusterError {
    let code = error
        .as_database_error()
        .and_then(|e| e.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some(INVALID_PASSWORD) | Some(INVALID_AUTHORIZATION) => ClusterError::AuthFailed(user.to_string()),
        _ => ClusterError::Unreachable(error.to_string()),
    }
}

#[async_trait]
impl Inspector for PgInspector {
    async fn database_size(&self, database: &str) -> Result<DatabaseSize, ClusterError> {
        let (bytes, pretty): (i64, String) =
            sqlx::query_as("SELECT pg_database_size($1::name), pg_size_pretty(pg_database_size($1::name))")
                .bind(database)
                .fetch_one(&self.admin_pool())
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(_) => ClusterError::Statement(e),
                    other => ClusterError::Unreachable(other.to_string()),
                })?;

        Ok(DatabaseSize { bytes, pretty })
    }

    async fn list_tables(&self, target: ConnectTarget) -> Result<Vec<String>, ClusterError> {
        let options = self.target_options(&target);

        let mut connection = match tokio::time::timeout(self.connect_timeout, options.connect()).await {
            Ok(Ok(connection)) => connection,
            Ok(Err(e)) => return Err(classify_connect_error(&target.user, e)),
            Err(_) => {
                return Err(ClusterError::Unreachable(format!(
                    "connection to {} timed out",
                    target.database
                )))
            }
        };

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT table_schema::text, table_name::text
            FROM information_schema.tables
            WHERE table_type = 'BASE TABLE'
              AND table_schema NOT IN ('pg_catalog', 'information_schema')
            ORDER BY table_schema, table_name
            "#,
        )
        .fetch_all(&mut connection)
        .await
        .map_err(|e| ClusterError::Unreachable(e.to_string()))?;

        if let Err(e) = connection.close().await {
            debug!("Closing inspection connection failed: {}", e);
        }

        Ok(rows
            .into_iter()
            .map(|(schema, table)| {
                if schema == "public" {
                    table
                } else {
                    format!("{}.{}", schema, table)
                }
            })
            .collect())
    }
}
