// handlers/protected/requests/mod.rs - Request lifecycle for owners

pub mod change_password; // POST /api/requests/change-password/:id/
pub mod create;          // POST /api/requests/create/
pub mod delete;          // POST /api/requests/delete/:id/
pub mod inspect;         // GET /api/requests/size/:id/, POST /api/requests/tables/:id/
pub mod list;            // GET /api/requests/my/
pub mod reveal;          // POST /api/requests/reveal/:id/

pub use change_password::request_change_password;
pub use create::request_create;
pub use delete::request_delete;
pub use inspect::{request_size, request_tables};
pub use list::request_list_mine;
pub use reveal::request_reveal;

use serde::Deserialize;

use crate::vault::Secret;

/// Body carrying a password, used by change-password and tables
#[derive(Deserialize)]
pub struct PasswordBody {
    pub password: String,
}

impl PasswordBody {
    pub fn into_secret(self) -> Secret {
        Secret::new(self.password)
    }
}
