//! # homerule-adapter-storage-sqlite-sqlx
//!
//! `SQLite` persistence adapter using [sqlx](https://docs.rs/sqlx).
//!
//! ## Responsibilities
//! - Implement the repository port traits defined in `homerule-app::ports`
//! - Back the `FeedFacade` port with a `feeds` table
//! - Manage `SQLite` connection pool lifecycle
//! - Run database migrations (using sqlx embedded migrations)
//! - Map between domain types and database rows, and execution queries to SQL
//!
//! ## Dependency rule
//! Depends on `homerule-app` (for port traits) and `homerule-domain` (for domain types).
//! The `app` and `domain` crates must never reference this adapter.

mod codec;

pub mod automation_repo;
pub mod component_repo;
pub mod error;
pub mod execution_repo;
pub mod feed_store;
pub mod pool;

pub use automation_repo::SqliteAutomationRepository;
pub use component_repo::SqliteComponentRepository;
pub use execution_repo::SqliteExecutionRepository;
pub use feed_store::SqliteFeedStore;
pub use pool::{Config, Database};
