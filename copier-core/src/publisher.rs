//! Shared model and change-detection for the master state publisher
//! (§4.3). The binary crate (`copier-publisher`) owns the actual file and
//! HTTP I/O; this module holds the serialisable snapshot shape and the
//! memoised "did it change" check so the file writer implements "write
//! iff the payload differs" without being fooled by a timestamp that
//! changes every poll regardless of position content.
//!
//! Grounded on `build_state`/`write_state_if_changed` in
//! `examples/original_source/master_feed.py`. Open Question, recorded in
//! DESIGN.md: the prototype's `last_updated: time.time()` is embedded in
//! the exact bytes being diffed, which would defeat "one write per actual
//! change" since the timestamp differs every call. Here the diff is taken
//! over positions + symbol mapping only; `last_updated` is stamped fresh
//! each time a write actually happens.

use crate::model::{Position, Side, SymbolMapping};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolMappingEntry {
    pub master_symbol: String,
    pub slave_symbol: String,
    pub slave_lot: f64,
}

impl From<&SymbolMapping> for SymbolMappingEntry {
    fn from(m: &SymbolMapping) -> Self {
        Self {
            master_symbol: m.master_symbol.clone(),
            slave_symbol: m.slave_symbol.clone(),
            slave_lot: m.slave_lot,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionEntry {
    pub ticket: u64,
    pub symbol: String,
    /// MT5's native `POSITION_TYPE` integer constant: `0` = buy, `1` = sell
    /// (`examples/original_source/master_feed.py`'s `"type": int(p.type)`).
    #[serde(rename = "type")]
    pub side: u8,
    pub volume: f64,
    pub price_open: f64,
    pub sl: f64,
    pub tp: f64,
    pub time: i64,
    pub comment: String,
}

impl From<&Position> for PositionEntry {
    fn from(p: &Position) -> Self {
        Self {
            ticket: p.ticket,
            symbol: p.symbol.clone(),
            side: match p.side {
                Side::Buy => 0,
                Side::Sell => 1,
            },
            volume: p.volume,
            price_open: p.price_open,
            sl: p.sl,
            tp: p.tp,
            time: p.open_time.timestamp(),
            comment: p.comment.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    symbol_mapping: Vec<SymbolMappingEntry>,
    positions: Vec<PositionEntry>,
}

impl Content {
    fn build(positions: &[Position], symbol_mapping: &[SymbolMapping]) -> Self {
        Self {
            symbol_mapping: symbol_mapping.iter().map(Into::into).collect(),
            positions: positions.iter().map(Into::into).collect(),
        }
    }
}

/// The JSON snapshot shape described in §4.3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterState {
    pub last_updated: f64,
    pub symbol_mapping: Vec<SymbolMappingEntry>,
    pub positions: Vec<PositionEntry>,
}

impl MasterState {
    pub fn build(positions: &[Position], symbol_mapping: &[SymbolMapping], last_updated: f64) -> Self {
        let content = Content::build(positions, symbol_mapping);
        Self {
            last_updated,
            symbol_mapping: content.symbol_mapping,
            positions: content.positions,
        }
    }

    /// Serialised with the same compact shape the original prototype used
    /// (`json.dumps(..., separators=(",", ":"))`).
    pub fn to_compact_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Tracks the last-seen position content (independent of `last_updated`)
/// so the caller can implement "write the file iff the positions/mapping
/// differ from the previous poll" (§4.3, testable property 6).
#[derive(Debug, Default)]
pub struct ChangeMemo {
    last_content_json: Option<String>,
}

impl ChangeMemo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records the new baseline when the content
    /// differs from the last call; returns `false` (no write) when it is
    /// identical.
    pub fn content_changed(&mut self, positions: &[Position], symbol_mapping: &[SymbolMapping]) -> bool {
        let json = serde_json::to_string(&Content::build(positions, symbol_mapping))
            .expect("Content serialization is infallible");
        if self.last_content_json.as_deref() == Some(json.as_str()) {
            false
        } else {
            self.last_content_json = Some(json);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pos(ticket: u64) -> Position {
        Position {
            ticket,
            symbol: "EURUSD".into(),
            side: Side::Buy,
            volume: 0.1,
            price_open: 1.1,
            sl: 0.0,
            tp: 0.0,
            open_time: Utc::now(),
            comment: String::new(),
        }
    }

    #[test]
    fn identical_content_does_not_trigger_rewrite() {
        let mut memo = ChangeMemo::new();
        assert!(memo.content_changed(&[pos(1)], &[]));
        assert!(!memo.content_changed(&[pos(1)], &[]));
    }

    #[test]
    fn s6_one_write_per_actual_change_despite_advancing_timestamp() {
        let mut memo = ChangeMemo::new();
        let mut writes = 0;

        for t in 0..5 {
            // last_updated advances every poll even when position content
            // doesn't; the file write must still be memoised on content.
            let changed = memo.content_changed(&[pos(1)], &[]);
            let _state = MasterState::build(&[pos(1)], &[], t as f64);
            if changed {
                writes += 1;
            }
        }
        assert_eq!(writes, 1);

        let mut changed_pos = pos(1);
        changed_pos.tp = 1.2345;
        if memo.content_changed(&[changed_pos], &[]) {
            writes += 1;
        }
        assert_eq!(writes, 2);
    }

    #[test]
    fn to_compact_json_has_no_extra_whitespace() {
        let state = MasterState::build(&[pos(1)], &[], 1.0);
        let json = state.to_compact_json().unwrap();
        assert!(!json.contains(' '));
    }
}
