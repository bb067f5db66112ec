// handlers/elevated/admin/mod.rs - Request review handlers

pub mod decide;  // POST /api/admin/requests/{approve,reject}/:id/
pub mod pending; // GET /api/admin/requests/pending/

pub use decide::{request_approve, request_reject};
pub use pending::request_list_pending;
