//! Ticket mapping, the `IgnoredSet`, and the per-master-ticket state
//! machine (§3, §4.2.4). Shaped after `mt-bridge/src/ticket_mapper.rs`'s
//! bidirectional active-map, generalised with the ignored set and explicit
//! states the spec requires.

use std::collections::{HashMap, HashSet};

/// Lifecycle state of a master ticket, mirroring §4.2.4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    PreExisting,
    Unseen,
    PendingOpen,
    Mirrored,
    PendingClose,
    Closed,
}

#[derive(Debug, Default)]
pub struct TicketMapper {
    master_to_slave: HashMap<u64, u64>,
    slave_to_master: HashMap<u64, u64>,
    ignored: HashSet<u64>,
    /// Master tickets ever seen and closed; kept only so `state_of` can
    /// distinguish "closed" from "never observed" for test assertions.
    closed: HashSet<u64>,
    /// The engine's belief of each mirrored slave position's `(sl, tp)`,
    /// updated on open and on every successful modify. Event derivation
    /// (§4.2 phase 1) only ever reads the master snapshot, so SL/TP drift
    /// is detected by diffing against this shadow rather than re-querying
    /// the slave account mid-snapshot.
    last_sl_tp: HashMap<u64, (f64, f64)>,
}

impl TicketMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the master tickets open at engine start-up as pre-existing.
    /// Called exactly once; the resulting set is immutable afterward.
    pub fn record_existing_trades(&mut self, tickets: impl IntoIterator<Item = u64>) {
        self.ignored.extend(tickets);
    }

    pub fn is_ignored(&self, master_ticket: u64) -> bool {
        self.ignored.contains(&master_ticket)
    }

    pub fn is_mapped(&self, master_ticket: u64) -> bool {
        self.master_to_slave.contains_key(&master_ticket)
    }

    pub fn slave_for(&self, master_ticket: u64) -> Option<u64> {
        self.master_to_slave.get(&master_ticket).copied()
    }

    pub fn master_for(&self, slave_ticket: u64) -> Option<u64> {
        self.slave_to_master.get(&slave_ticket).copied()
    }

    /// Inserts a mapping on successful open. A master ticket is never both
    /// ignored and mapped.
    pub fn insert(&mut self, master_ticket: u64, slave_ticket: u64, sl: f64, tp: f64) {
        debug_assert!(!self.ignored.contains(&master_ticket));
        self.master_to_slave.insert(master_ticket, slave_ticket);
        self.slave_to_master.insert(slave_ticket, master_ticket);
        self.last_sl_tp.insert(master_ticket, (sl, tp));
    }

    /// Records the SL/TP the engine most recently pushed to the slave side
    /// for this mirrored ticket.
    pub fn set_last_sl_tp(&mut self, master_ticket: u64, sl: f64, tp: f64) {
        self.last_sl_tp.insert(master_ticket, (sl, tp));
    }

    pub fn last_sl_tp(&self, master_ticket: u64) -> Option<(f64, f64)> {
        self.last_sl_tp.get(&master_ticket).copied()
    }

    /// Removes a mapping on successful close (or on discovering the slave
    /// side already vanished).
    pub fn remove(&mut self, master_ticket: u64) -> Option<u64> {
        let slave = self.master_to_slave.remove(&master_ticket)?;
        self.slave_to_master.remove(&slave);
        self.last_sl_tp.remove(&master_ticket);
        self.closed.insert(master_ticket);
        Some(slave)
    }

    pub fn mapped_master_tickets(&self) -> impl Iterator<Item = u64> + '_ {
        self.master_to_slave.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.master_to_slave.len()
    }

    pub fn is_empty(&self) -> bool {
        self.master_to_slave.is_empty()
    }

    /// Computes the current state of a master ticket. `in_current_snapshot`
    /// and `pending_open`/`pending_close` reflect the current poll's
    /// derived event sets, since `PENDING_OPEN`/`PENDING_CLOSE` only exist
    /// within a single batch.
    pub fn state_of(
        &self,
        master_ticket: u64,
        pending_open: bool,
        pending_close: bool,
    ) -> TicketState {
        if self.ignored.contains(&master_ticket) {
            return TicketState::PreExisting;
        }
        if pending_close {
            return TicketState::PendingClose;
        }
        if self.is_mapped(master_ticket) {
            return TicketState::Mirrored;
        }
        if pending_open {
            return TicketState::PendingOpen;
        }
        if self.closed.contains(&master_ticket) {
            return TicketState::Closed;
        }
        TicketState::Unseen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pre_existing_tickets_are_ignored_and_never_mapped() {
        let mut mapper = TicketMapper::new();
        mapper.record_existing_trades([100, 101]);
        assert!(mapper.is_ignored(100));
        assert_eq!(mapper.state_of(100, false, false), TicketState::PreExisting);
    }

    #[test]
    fn insert_and_remove_round_trip() {
        let mut mapper = TicketMapper::new();
        mapper.insert(200, 9000, 1.2, 1.3);
        assert_eq!(mapper.slave_for(200), Some(9000));
        assert_eq!(mapper.master_for(9000), Some(200));
        assert_eq!(mapper.last_sl_tp(200), Some((1.2, 1.3)));
        assert_eq!(mapper.state_of(200, false, false), TicketState::Mirrored);

        let removed = mapper.remove(200);
        assert_eq!(removed, Some(9000));
        assert_eq!(mapper.slave_for(200), None);
        assert_eq!(mapper.master_for(9000), None);
        assert_eq!(mapper.last_sl_tp(200), None);
        assert_eq!(mapper.state_of(200, false, false), TicketState::Closed);
    }

    #[test]
    fn unseen_ticket_with_no_pending_flags() {
        let mapper = TicketMapper::new();
        assert_eq!(mapper.state_of(999, false, false), TicketState::Unseen);
    }

    #[test]
    fn never_both_ignored_and_mapped() {
        let mut mapper = TicketMapper::new();
        mapper.record_existing_trades([1]);
        assert!(mapper.is_ignored(1));
        assert!(!mapper.is_mapped(1));
    }
}
