pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod ledger_repo;
pub mod memory;
pub mod notification_repo;
pub mod order_repo;

pub use catalog_repo::PgCatalog;
pub use database::DbClient;
pub use memory::{MemoryCatalog, MemoryStore};
pub use order_repo::PgStore;
