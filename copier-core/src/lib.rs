//! Core library for the trade-copier replication engine: config loading,
//! the broker session manager, the ticket mapper and filling-mode cache,
//! the audit log writer, the replication engine itself, and the master
//! state publisher's shared snapshot model.

pub mod audit_log;
pub mod broker;
pub mod config;
pub mod engine;
pub mod errors;
pub mod filling_cache;
pub mod model;
pub mod publisher;
pub mod session;
pub mod ticket_mapper;

#[cfg(feature = "sim")]
pub mod sim_broker;

pub use broker::BrokerClient;
pub use engine::{EngineConfig, ReplicationEngine};
pub use errors::CopierError;
pub use session::SessionManager;
