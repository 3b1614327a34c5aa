pub mod backend;
mod bootstrap;
pub mod json;
pub mod models;
pub mod store;
mod tables;

pub use backend::Backend;
pub use bootstrap::{ensure_documents, CLI_KEY_LENGTH};
pub use json::JsonBackend;
pub use store::{Store, StoreError};
pub use tables::*;
