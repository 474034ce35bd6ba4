//! The narrow broker-client capability interface the engine depends on
//! (§6). The real terminal client library is an external collaborator and
//! out of scope; implementors wrap whatever native client API a given
//! broker's terminal exposes. `sim::SimBroker` is the in-repo double used
//! for tests and the default demo run.

use crate::model::{AccountCredentials, OrderRequest, OrderResult, Position, SymbolInfo, Tick};
use async_trait::async_trait;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Initialises the terminal session. Called at most once per process;
    /// failure is fatal (§4.1).
    async fn initialise(&self) -> anyhow::Result<()>;

    /// Tears down the terminal session on process exit.
    async fn shutdown(&self) -> anyhow::Result<()>;

    /// Logs into the given account. Recoverable on failure: the caller
    /// (the session manager) must not advance its notion of the current
    /// login when this returns `Err`.
    async fn login(&self, creds: &AccountCredentials) -> anyhow::Result<()>;

    /// Returns currently open positions, optionally filtered to one
    /// ticket (used by close dispatch to probe a single slave position).
    async fn positions_get(&self, ticket: Option<u64>) -> anyhow::Result<Vec<Position>>;

    async fn symbol_info(&self, symbol: &str) -> anyhow::Result<SymbolInfo>;

    async fn symbol_info_tick(&self, symbol: &str) -> anyhow::Result<Tick>;

    async fn symbol_select(&self, symbol: &str) -> anyhow::Result<()>;

    async fn order_send(&self, request: &OrderRequest) -> anyhow::Result<OrderResult>;
}
