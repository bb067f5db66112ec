pub mod inspection_service;
pub mod provisioning_service;

pub use inspection_service::InspectionService;
pub use provisioning_service::{ConnectionInfo, ProvisioningError, ProvisioningService, RevealedCredentials};
