use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Market side of a position or order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// The opposite side, used when building a close request.
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }
}

/// An open position as observed on a broker account.
///
/// `sl`/`tp` of `0.0` mean "unset", matching the broker convention described
/// in the data model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticket: u64,
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub open_time: DateTime<Utc>,
    pub comment: String,
}

impl Position {
    pub fn sl_tp(&self) -> (f64, f64) {
        (self.sl, self.tp)
    }
}

/// A row of the symbol-mapping table, keyed uniquely by `master_symbol`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SymbolMapping {
    pub master_symbol: String,
    pub slave_symbol: String,
    pub slave_lot: f64,
}

/// One broker account's login triple.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AccountCredentials {
    pub login: u64,
    pub password: String,
    pub server: String,
}

/// The full credentials file: one master account, one slave account.
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub master: AccountCredentials,
    pub slave: AccountCredentials,
}

/// Filling-mode policy for market execution of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FillingMode {
    Fok,
    Ioc,
    Return,
}

impl FillingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FillingMode::Fok => "FOK",
            FillingMode::Ioc => "IOC",
            FillingMode::Return => "RETURN",
        }
    }

    /// Discovery order mandated by §4.2.1: IOC first (most common, lowest
    /// slippage envelope), then FOK, then RETURN.
    pub const DISCOVERY_ORDER: [FillingMode; 3] =
        [FillingMode::Ioc, FillingMode::Fok, FillingMode::Return];
}

/// Broker result code. Only `Done` and `InvalidFill` drive engine behaviour;
/// everything else is bucketed into `Other` and logged as a non-fill
/// failure per the error table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetCode {
    Done,
    InvalidFill,
    Other(i32),
}

#[derive(Debug, Clone, Copy)]
pub struct Tick {
    pub bid: f64,
    pub ask: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct SymbolInfo {
    pub filling_mode: Option<FillingMode>,
}

/// Order time-in-force. Only `Gtc` (good-til-cancelled) is used by the
/// engine (§4.2.1), but this is a named field of the deal contract (§6)
/// rather than an implicit default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeMode {
    Gtc,
}

impl TimeMode {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeMode::Gtc => "GTC",
        }
    }
}

/// A market-deal request, built by the engine for both opens and closes.
#[derive(Debug, Clone)]
pub struct DealRequest {
    pub symbol: String,
    pub side: Side,
    pub volume: f64,
    pub price: f64,
    pub sl: f64,
    pub tp: f64,
    pub deviation: u32,
    pub magic: u64,
    pub comment: String,
    pub filling_mode: FillingMode,
    pub time_mode: TimeMode,
    /// Present only for close requests: the slave position being closed.
    pub position: Option<u64>,
}

/// A modify-SL/TP request against an existing slave position.
#[derive(Debug, Clone)]
pub struct ModifyRequest {
    pub position: u64,
    pub sl: f64,
    pub tp: f64,
}

/// A single `order_send` request, covering both market deals and SL/TP
/// modifications — the broker capability interface (§6) exposes one
/// `order_send` entry point, the way `TRADE_ACTION_DEAL` and
/// `TRADE_ACTION_SLTP` share one `order_send` call in the original broker
/// API (`examples/original_source/mt5_connect.py`).
#[derive(Debug, Clone)]
pub enum OrderRequest {
    Deal(DealRequest),
    ModifySlTp(ModifyRequest),
}

#[derive(Debug, Clone)]
pub struct OrderResult {
    pub retcode: RetCode,
    pub order: u64,
    pub comment: String,
}
