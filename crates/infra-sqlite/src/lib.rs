// Conveyor Infrastructure - SQLite Adapter
// Implements: QueueEngine

mod connection;
mod engine;
mod migration;

pub use connection::create_pool;
pub use engine::SqliteQueueEngine;
pub use migration::run_migrations;

// Note: sqlx::Error conversion is handled by a mapping helper in engine.rs
// due to Rust's orphan rules (cannot implement From<sqlx::Error> for AppError here)
