pub mod inspector;
pub mod manager;
pub mod models;
pub mod provisioner;
pub mod repository;

pub use inspector::{ConnectTarget, DatabaseSize, Inspector, PgInspector};
pub use manager::{DatabaseError, DatabaseManager, MIGRATOR};
pub use provisioner::{ClusterError, ClusterNames, PgProvisioner, Provisioner};
pub use repository::{PgRequestDirectory, RequestDirectory, RequestLock, StoreError, TenantScope};
