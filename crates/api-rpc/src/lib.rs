//! JSON-RPC API Layer
//!
//! Control plane for Conveyor: queue administration, enqueue and removal
//! over JSON-RPC 2.0 on localhost.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
