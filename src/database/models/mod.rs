pub mod request;

pub use request::{
    validate_db_name, DatabaseRequestRow, NewRequest, ProvisionedDatabase, ProvisioningRequest,
    RequestState, RequestStatus, RequestView,
};
