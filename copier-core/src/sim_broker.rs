//! An in-memory, two-account broker double implementing [`BrokerClient`].
//!
//! Used by `copier-core`'s own tests, by integration tests in the binary
//! crates, and as the default run mode for the demo binaries since the
//! real terminal client library is out of scope (§1). Grounded on the
//! shape of `order_send`/`positions_get` in
//! `examples/original_source/mt5_connect.py`, reimplemented as a pure
//! in-memory simulator rather than a Python-to-Rust translation.

use crate::broker::BrokerClient;
use crate::model::{
    AccountCredentials, FillingMode, OrderRequest, OrderResult, Position, RetCode, Side, SymbolInfo, Tick,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    current_login: Option<u64>,
    /// The first distinct logins seen via `login()` become "master" and
    /// "slave" respectively, so the double works whether the caller uses
    /// arbitrary real-looking account numbers (the binaries) or small
    /// synthetic ones (unit tests).
    master_login: Option<u64>,
    slave_login: Option<u64>,
    master_positions: HashMap<u64, Position>,
    slave_positions: HashMap<u64, Position>,
    next_slave_ticket: u64,
    rejected_fills: HashSet<(String, FillingMode)>,
    attempt_counts: HashMap<String, u64>,
}

pub struct SimBroker {
    state: Mutex<State>,
}

impl SimBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { next_slave_ticket: 9000, ..State::default() }),
        }
    }

    pub async fn seed_master_position(&self, ticket: u64, symbol: &str, side: Side, volume: f64, sl: f64, tp: f64) {
        let mut state = self.state.lock().await;
        state.master_positions.insert(
            ticket,
            Position {
                ticket,
                symbol: symbol.to_string(),
                side,
                volume,
                price_open: 1.0,
                sl,
                tp,
                open_time: Utc::now(),
                comment: String::new(),
            },
        );
    }

    pub async fn close_master_position(&self, ticket: u64) {
        self.state.lock().await.master_positions.remove(&ticket);
    }

    pub async fn update_master_sl_tp(&self, ticket: u64, sl: f64, tp: f64) {
        let mut state = self.state.lock().await;
        if let Some(p) = state.master_positions.get_mut(&ticket) {
            p.sl = sl;
            p.tp = tp;
        }
    }

    pub async fn reject_filling_mode(&self, slave_symbol: &str, mode: FillingMode) {
        self.state.lock().await.rejected_fills.insert((slave_symbol.to_string(), mode));
    }

    pub async fn attempt_count(&self, slave_symbol: &str) -> u64 {
        self.state.lock().await.attempt_counts.get(slave_symbol).copied().unwrap_or(0)
    }

    pub async fn slave_orders(&self) -> Vec<Position> {
        self.state.lock().await.slave_positions.values().cloned().collect()
    }

    pub async fn slave_position_sl_tp(&self, ticket: u64) -> Option<(f64, f64)> {
        self.state.lock().await.slave_positions.get(&ticket).map(|p| (p.sl, p.tp))
    }
}

impl Default for SimBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrokerClient for SimBroker {
    async fn initialise(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn login(&self, creds: &AccountCredentials) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.master_login.is_none() {
            state.master_login = Some(creds.login);
        } else if state.slave_login.is_none() && Some(creds.login) != state.master_login {
            state.slave_login = Some(creds.login);
        }
        state.current_login = Some(creds.login);
        Ok(())
    }

    async fn positions_get(&self, ticket: Option<u64>) -> anyhow::Result<Vec<Position>> {
        let state = self.state.lock().await;
        let source = if state.current_login.is_some() && state.current_login == state.master_login {
            &state.master_positions
        } else {
            &state.slave_positions
        };
        Ok(match ticket {
            Some(t) => source.get(&t).cloned().into_iter().collect(),
            None => source.values().cloned().collect(),
        })
    }

    async fn symbol_info(&self, _symbol: &str) -> anyhow::Result<SymbolInfo> {
        Ok(SymbolInfo { filling_mode: None })
    }

    async fn symbol_info_tick(&self, _symbol: &str) -> anyhow::Result<Tick> {
        Ok(Tick { bid: 1.1000, ask: 1.1002 })
    }

    async fn symbol_select(&self, _symbol: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn order_send(&self, request: &OrderRequest) -> anyhow::Result<OrderResult> {
        let mut state = self.state.lock().await;
        match request {
            OrderRequest::Deal(deal) => {
                *state.attempt_counts.entry(deal.symbol.clone()).or_insert(0) += 1;
                if state.rejected_fills.contains(&(deal.symbol.clone(), deal.filling_mode)) {
                    return Ok(OrderResult { retcode: RetCode::InvalidFill, order: 0, comment: "invalid fill".into() });
                }
                if let Some(position) = deal.position {
                    state.slave_positions.remove(&position);
                    return Ok(OrderResult { retcode: RetCode::Done, order: position, comment: "closed".into() });
                }
                let ticket = state.next_slave_ticket;
                state.next_slave_ticket += 1;
                state.slave_positions.insert(
                    ticket,
                    Position {
                        ticket,
                        symbol: deal.symbol.clone(),
                        side: deal.side,
                        volume: deal.volume,
                        price_open: deal.price,
                        sl: deal.sl,
                        tp: deal.tp,
                        open_time: Utc::now(),
                        comment: deal.comment.clone(),
                    },
                );
                Ok(OrderResult { retcode: RetCode::Done, order: ticket, comment: "done".into() })
            }
            OrderRequest::ModifySlTp(modify) => {
                if let Some(pos) = state.slave_positions.get_mut(&modify.position) {
                    pos.sl = modify.sl;
                    pos.tp = modify.tp;
                    Ok(OrderResult { retcode: RetCode::Done, order: modify.position, comment: "done".into() })
                } else {
                    Ok(OrderResult { retcode: RetCode::Other(-1), order: 0, comment: "position not found".into() })
                }
            }
        }
    }
}
