//! The replication engine (§4.2): the polling loop, event derivation, and
//! ordered dispatch of opens/mods/closes against the slave account.
//!
//! Shaped after the original prototype's `copy_trades` / `sync_modifications`
//! / `sync_closures` functions in `examples/original_source/mt5_connect.py`,
//! restructured as fields of a value (§9 "no global mutable state") rather
//! than module-level globals, and generalised over any `BrokerClient`.

use crate::audit_log::AuditLog;
use crate::broker::BrokerClient;
use crate::filling_cache::FillingModeCache;
use crate::model::{
    AccountCredentials, DealRequest, FillingMode, ModifyRequest, OrderRequest, Position, RetCode,
    Side, SymbolMapping, TimeMode,
};
use crate::session::SessionManager;
use crate::ticket_mapper::TicketMapper;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Tunable knobs called out in §9 REDESIGN FLAGS: legacy deviation
/// constants and the poll interval are configuration, not literals.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub poll_interval: Duration,
    pub deviation_open: u32,
    pub deviation_close: u32,
    pub magic: u64,
    pub open_comment: String,
    pub close_comment: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(300),
            deviation_open: 120,
            deviation_close: 35,
            magic: 123_456,
            open_comment: "Copied Trade".to_string(),
            close_comment: "Closed by Copier".to_string(),
        }
    }
}

pub struct ReplicationEngine<B: BrokerClient + ?Sized> {
    session: Arc<SessionManager<B>>,
    master: AccountCredentials,
    slave: AccountCredentials,
    symbol_map: HashMap<String, SymbolMapping>,
    tickets: TicketMapper,
    filling_cache: FillingModeCache,
    audit: AuditLog,
    config: EngineConfig,
    started: bool,
}

/// Events derived from one master snapshot (§4.2 phase 2), each already in
/// ascending-ticket order.
struct EventBatch {
    opens: Vec<Position>,
    mods: Vec<Position>,
    closes: Vec<(u64, u64)>,
}

impl<B: BrokerClient + ?Sized> ReplicationEngine<B> {
    pub fn new(
        session: Arc<SessionManager<B>>,
        master: AccountCredentials,
        slave: AccountCredentials,
        symbol_map: HashMap<String, SymbolMapping>,
        audit: AuditLog,
        config: EngineConfig,
    ) -> Self {
        Self {
            session,
            master,
            slave,
            symbol_map,
            tickets: TicketMapper::new(),
            filling_cache: FillingModeCache::new(),
            audit,
            config,
            started: false,
        }
    }

    /// Initialises the terminal, logs into master, and records the
    /// positions open at that instant as pre-existing (§3, `IgnoredSet`).
    /// Must be called once before `run_once`/`run_forever`.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        self.session.initialise().await?;
        self.session.switch_to(&self.master).await?;
        let existing = self.session.broker().positions_get(None).await?;
        self.tickets
            .record_existing_trades(existing.iter().map(|p| p.ticket));
        info!(count = existing.len(), "ignoring pre-existing master positions");
        self.started = true;
        Ok(())
    }

    /// Runs the poll loop until cancelled. Each iteration is short and
    /// never leaves an in-flight order un-audited (§5 cancellation
    /// contract); errors from a single iteration are logged and do not
    /// stop the loop (§7: "the engine never raises ... in the steady-state
    /// loop").
    pub async fn run_forever(&mut self) -> anyhow::Result<()> {
        if !self.started {
            self.start().await?;
        }
        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "poll iteration failed");
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// One polling iteration: snapshot, derive, dispatch. Public so tests
    /// and a cooperative caller (e.g. under a test harness) can single-step
    /// the engine.
    pub async fn run_once(&mut self) -> anyhow::Result<()> {
        self.session.switch_to(&self.master).await?;
        let snapshot = self.session.broker().positions_get(None).await?;
        let batch = self.derive_events(&snapshot);

        if batch.opens.is_empty() && batch.mods.is_empty() && batch.closes.is_empty() {
            return Ok(());
        }

        self.session.switch_to(&self.slave).await?;
        for p in &batch.opens {
            self.dispatch_open(p).await;
        }
        for p in &batch.mods {
            self.dispatch_modify(p).await;
        }
        for (master_ticket, slave_ticket) in &batch.closes {
            self.dispatch_close(*master_ticket, *slave_ticket).await;
        }
        self.session.switch_to(&self.master).await?;
        Ok(())
    }

    /// §4.2 phase 2: `Opens`, `Mods`, `Closes` as set comprehensions over
    /// the current snapshot and the ticket mapping, each sorted by
    /// ascending ticket for deterministic dispatch order.
    fn derive_events(&self, snapshot: &[Position]) -> EventBatch {
        let mut opens = Vec::new();
        let mut mods = Vec::new();

        let mut sorted: Vec<&Position> = snapshot.iter().collect();
        sorted.sort_by_key(|p| p.ticket);

        let mut seen = std::collections::HashSet::new();
        for p in sorted {
            seen.insert(p.ticket);
            if self.tickets.is_ignored(p.ticket) {
                continue;
            }
            if !self.tickets.is_mapped(p.ticket) {
                opens.push(p.clone());
                continue;
            }
            if let Some(last) = self.tickets.last_sl_tp(p.ticket) {
                if p.sl_tp() != last {
                    mods.push(p.clone());
                }
            }
        }

        let mut closes: Vec<(u64, u64)> = self
            .tickets
            .mapped_master_tickets()
            .filter(|t| !seen.contains(t))
            .filter_map(|t| self.tickets.slave_for(t).map(|s| (t, s)))
            .collect();
        closes.sort_by_key(|(master, _)| *master);

        EventBatch { opens, mods, closes }
    }

    async fn dispatch_open(&mut self, p: &Position) {
        let mapping = match self.symbol_map.get(&p.symbol) {
            Some(m) => m.clone(),
            None => {
                info!(symbol = %p.symbol, ticket = p.ticket, "no symbol mapping, skipping position");
                return;
            }
        };

        let slave_volume = (p.volume * mapping.slave_lot).max(0.01);
        let broker = self.session.broker().clone();

        if let Err(e) = broker.symbol_select(&mapping.slave_symbol).await {
            warn!(symbol = %mapping.slave_symbol, error = %e, "symbol_select failed, skipping open");
            return;
        }
        let tick = match broker.symbol_info_tick(&mapping.slave_symbol).await {
            Ok(t) => t,
            Err(e) => {
                warn!(symbol = %mapping.slave_symbol, error = %e, "failed to read tick, skipping open");
                return;
            }
        };
        let price = match p.side {
            Side::Buy => tick.bid,
            Side::Sell => tick.ask,
        };

        let deal = DealRequest {
            symbol: mapping.slave_symbol.clone(),
            side: p.side,
            volume: slave_volume,
            price,
            sl: p.sl,
            tp: p.tp,
            deviation: self.config.deviation_open,
            magic: self.config.magic,
            comment: self.config.open_comment.clone(),
            filling_mode: FillingMode::Ioc,
            time_mode: TimeMode::Gtc,
            position: None,
        };

        let outcome = self.send_with_filling_discovery(&mapping.slave_symbol, deal).await;
        match outcome {
            DiscoveryOutcome::Done { order, filling, latency_ms } => {
                self.tickets.insert(p.ticket, order, p.sl, p.tp);
                if let Err(e) = self
                    .audit
                    .record_open(
                        Utc::now(),
                        p.ticket,
                        order,
                        &p.symbol,
                        &mapping.slave_symbol,
                        p.volume,
                        slave_volume,
                        p.side,
                        price,
                        p.sl,
                        p.tp,
                        filling,
                        latency_ms,
                    )
                    .await
                {
                    error!(error = %e, "audit log write failed");
                }
            }
            DiscoveryOutcome::Failed(reason) => {
                error!(ticket = p.ticket, symbol = %mapping.slave_symbol, reason = %reason, "open dispatch failed");
            }
        }
    }

    async fn dispatch_modify(&mut self, p: &Position) {
        let Some(slave_ticket) = self.tickets.slave_for(p.ticket) else {
            return;
        };
        let request = OrderRequest::ModifySlTp(ModifyRequest { position: slave_ticket, sl: p.sl, tp: p.tp });
        let start = Instant::now();
        let result = self.session.broker().order_send(&request).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(r) if matches!(r.retcode, RetCode::Done) => {
                self.tickets.set_last_sl_tp(p.ticket, p.sl, p.tp);
                if let Err(e) = self
                    .audit
                    .record_modify(Utc::now(), p.ticket, slave_ticket, &p.symbol, p.sl, p.tp, latency_ms)
                    .await
                {
                    error!(error = %e, "audit log write failed");
                }
            }
            Ok(r) => {
                // §9: the original sometimes logged success on a non-DONE
                // retcode here. Never replicate that; only a DONE retcode
                // advances the shadow state or is audited.
                warn!(ticket = p.ticket, retcode = ?r.retcode, "SL/TP modify did not return DONE, will retry next poll");
            }
            Err(e) => {
                warn!(ticket = p.ticket, error = %e, "SL/TP modify request failed, will retry next poll");
            }
        }
    }

    async fn dispatch_close(&mut self, master_ticket: u64, slave_ticket: u64) {
        let broker = self.session.broker().clone();
        let existing = match broker.positions_get(Some(slave_ticket)).await {
            Ok(v) => v,
            Err(e) => {
                warn!(slave_ticket, error = %e, "failed to probe slave position before close");
                return;
            }
        };
        let Some(slave_pos) = existing.into_iter().find(|p| p.ticket == slave_ticket) else {
            // Externally closed already: purge silently (§7).
            self.tickets.remove(master_ticket);
            return;
        };

        if let Err(e) = broker.symbol_select(&slave_pos.symbol).await {
            warn!(symbol = %slave_pos.symbol, error = %e, "symbol_select failed, skipping close");
            return;
        }
        let tick = match broker.symbol_info_tick(&slave_pos.symbol).await {
            Ok(t) => t,
            Err(e) => {
                warn!(symbol = %slave_pos.symbol, error = %e, "failed to read tick, skipping close");
                return;
            }
        };
        let close_side = slave_pos.side.opposite();
        let price = match close_side {
            Side::Buy => tick.bid,
            Side::Sell => tick.ask,
        };

        let deal = DealRequest {
            symbol: slave_pos.symbol.clone(),
            side: close_side,
            volume: slave_pos.volume,
            price,
            sl: 0.0,
            tp: 0.0,
            deviation: self.config.deviation_close,
            magic: self.config.magic,
            comment: self.config.close_comment.clone(),
            filling_mode: FillingMode::Ioc,
            time_mode: TimeMode::Gtc,
            position: Some(slave_ticket),
        };

        let outcome = self.send_with_filling_discovery(&slave_pos.symbol, deal).await;
        match outcome {
            DiscoveryOutcome::Done { filling, latency_ms, .. } => {
                self.tickets.remove(master_ticket);
                if let Err(e) = self
                    .audit
                    .record_close(
                        Utc::now(),
                        master_ticket,
                        slave_ticket,
                        &slave_pos.symbol,
                        slave_pos.volume,
                        close_side,
                        filling,
                        latency_ms,
                    )
                    .await
                {
                    error!(error = %e, "audit log write failed");
                }
            }
            DiscoveryOutcome::Failed(reason) => {
                error!(master_ticket, slave_ticket, reason = %reason, "close dispatch failed");
            }
        }
    }

    /// §4.2.1 filling-mode discovery: try the cached mode first if one
    /// exists, then walk the fixed `IOC, FOK, RETURN` order (skipping the
    /// mode already tried from the cache). Stops at the first `DONE`, the
    /// first non-`INVALID_FILL` failure, or once the sequence is
    /// exhausted.
    async fn send_with_filling_discovery(
        &self,
        slave_symbol: &str,
        mut deal: DealRequest,
    ) -> DiscoveryOutcome {
        let cached = self.filling_cache.get(slave_symbol).await;
        let mut sequence: Vec<FillingMode> = Vec::with_capacity(4);
        if let Some(mode) = cached {
            sequence.push(mode);
        }
        for mode in FillingMode::DISCOVERY_ORDER {
            if Some(mode) != cached {
                sequence.push(mode);
            }
        }

        let broker = self.session.broker().clone();
        for mode in sequence {
            deal.filling_mode = mode;
            let request = OrderRequest::Deal(deal.clone());
            let start = Instant::now();
            let result = broker.order_send(&request).await;
            let latency_ms = start.elapsed().as_millis() as u64;

            match result {
                Ok(r) if matches!(r.retcode, RetCode::Done) => {
                    self.filling_cache.record_success(slave_symbol, mode).await;
                    return DiscoveryOutcome::Done { order: r.order, filling: mode, latency_ms };
                }
                Ok(r) if matches!(r.retcode, RetCode::InvalidFill) => {
                    debug!(symbol = slave_symbol, mode = mode.as_str(), "filling mode rejected, trying next");
                    self.filling_cache.invalidate_if_matches(slave_symbol, mode).await;
                    continue;
                }
                Ok(r) => {
                    return DiscoveryOutcome::Failed(format!("{:?}: {}", r.retcode, r.comment));
                }
                Err(e) => {
                    return DiscoveryOutcome::Failed(e.to_string());
                }
            }
        }
        DiscoveryOutcome::Failed("all filling modes rejected".to_string())
    }
}

enum DiscoveryOutcome {
    Done { order: u64, filling: FillingMode, latency_ms: u64 },
    Failed(String),
}

#[cfg(feature = "sim")]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim_broker::SimBroker;

    fn mapping(master: &str, slave: &str, lot: f64) -> HashMap<String, SymbolMapping> {
        let mut m = HashMap::new();
        m.insert(
            master.to_string(),
            SymbolMapping { master_symbol: master.to_string(), slave_symbol: slave.to_string(), slave_lot: lot },
        );
        m
    }

    fn creds(login: u64) -> AccountCredentials {
        AccountCredentials { login, password: "pw".into(), server: "srv".into() }
    }

    async fn make_engine(
        broker: Arc<SimBroker>,
        map: HashMap<String, SymbolMapping>,
        audit_path: &std::path::Path,
    ) -> ReplicationEngine<SimBroker> {
        let session = Arc::new(SessionManager::new(broker));
        let audit = AuditLog::open(audit_path).unwrap();
        ReplicationEngine::new(session, creds(1), creds(2), map, audit, EngineConfig::default())
    }

    #[tokio::test]
    async fn s1_pre_existing_ignored() {
        let broker = Arc::new(SimBroker::new());
        broker.seed_master_position(100, "EURUSD", Side::Buy, 1.0, 0.0, 0.0).await;
        let dir = tempfile::tempdir().unwrap();
        let mut engine = make_engine(broker.clone(), mapping("EURUSD", "EURUSD-STD", 1.0), &dir.path().join("orderlog.txt")).await;

        engine.start().await.unwrap();
        assert!(engine.tickets.is_ignored(100));
        engine.run_once().await.unwrap();
        assert!(broker.slave_orders().await.is_empty());
    }

    #[tokio::test]
    async fn s2_open_and_close() {
        let broker = Arc::new(SimBroker::new());
        broker.seed_master_position(100, "EURUSD", Side::Buy, 1.0, 0.0, 0.0).await;
        let dir = tempfile::tempdir().unwrap();
        let mut engine = make_engine(
            broker.clone(),
            mapping("XAUUSD", "XAUUSD.m", 0.5),
            &dir.path().join("orderlog.txt"),
        )
        .await;
        engine.start().await.unwrap();

        broker
            .seed_master_position(101, "XAUUSD", Side::Buy, 0.20, 2300.0, 2400.0)
            .await;
        engine.run_once().await.unwrap();

        let orders = broker.slave_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].volume, 0.10);
        assert_eq!(orders[0].side, Side::Buy);
        assert_eq!(orders[0].sl, 2300.0);
        assert_eq!(orders[0].tp, 2400.0);

        broker.close_master_position(101).await;
        engine.run_once().await.unwrap();
        assert_eq!(engine.tickets.slave_for(101), None);
    }

    #[tokio::test]
    async fn s3_volume_clamp() {
        let broker = Arc::new(SimBroker::new());
        let dir = tempfile::tempdir().unwrap();
        let mut engine = make_engine(
            broker.clone(),
            mapping("XAUUSD", "XAUUSD.m", 0.1),
            &dir.path().join("orderlog.txt"),
        )
        .await;
        engine.start().await.unwrap();

        broker
            .seed_master_position(102, "XAUUSD", Side::Sell, 0.001, 0.0, 0.0)
            .await;
        engine.run_once().await.unwrap();

        let orders = broker.slave_orders().await;
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].volume, 0.01);
    }

    #[tokio::test]
    async fn s4_filling_mode_discovery_then_cache_hit() {
        let broker = Arc::new(SimBroker::new());
        broker.reject_filling_mode("EURUSD-STD", FillingMode::Ioc).await;
        let dir = tempfile::tempdir().unwrap();
        let mut engine = make_engine(
            broker.clone(),
            mapping("EURUSD", "EURUSD-STD", 1.0),
            &dir.path().join("orderlog.txt"),
        )
        .await;
        engine.start().await.unwrap();

        broker.seed_master_position(200, "EURUSD", Side::Buy, 0.1, 0.0, 0.0).await;
        engine.run_once().await.unwrap();
        assert_eq!(engine.filling_cache.get("EURUSD-STD").await, Some(FillingMode::Fok));
        assert_eq!(broker.attempt_count("EURUSD-STD").await, 2);

        broker.seed_master_position(201, "EURUSD", Side::Buy, 0.1, 0.0, 0.0).await;
        engine.run_once().await.unwrap();
        // second open should hit cache and succeed in one round-trip
        assert_eq!(broker.attempt_count("EURUSD-STD").await, 3);
    }

    #[tokio::test]
    async fn s5_sl_tp_sync() {
        let broker = Arc::new(SimBroker::new());
        let dir = tempfile::tempdir().unwrap();
        let mut engine = make_engine(
            broker.clone(),
            mapping("EURUSD", "EURUSD-STD", 1.0),
            &dir.path().join("orderlog.txt"),
        )
        .await;
        engine.start().await.unwrap();

        broker.seed_master_position(200, "EURUSD", Side::Buy, 0.1, 0.0, 0.0).await;
        engine.run_once().await.unwrap();

        broker.update_master_sl_tp(200, 1.2345, 0.0).await;
        engine.run_once().await.unwrap();

        let slave_ticket = engine.tickets.slave_for(200).unwrap();
        let slave_sl_tp = broker.slave_position_sl_tp(slave_ticket).await.unwrap();
        assert_eq!(slave_sl_tp, (1.2345, 0.0));
    }

    #[tokio::test]
    async fn opens_before_mods_before_closes_within_one_batch() {
        let broker = Arc::new(SimBroker::new());
        let dir = tempfile::tempdir().unwrap();
        let mut engine = make_engine(
            broker.clone(),
            mapping("EURUSD", "EURUSD-STD", 1.0),
            &dir.path().join("orderlog.txt"),
        )
        .await;
        engine.start().await.unwrap();

        // ticket 300 opens and has a nonzero SL/TP in the very first batch
        // it's observed in: the mirror must exist before a diff is even
        // possible, so this also exercises "mods between opens and closes".
        broker.seed_master_position(300, "EURUSD", Side::Buy, 0.1, 1.0, 1.1).await;
        engine.run_once().await.unwrap();
        assert!(engine.tickets.is_mapped(300));
        assert_eq!(engine.tickets.last_sl_tp(300), Some((1.0, 1.1)));
    }
}
