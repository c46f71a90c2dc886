//! Slot pool: a fixed set of long and short slots
//!
//! The pool owns the handle→slot routing map. Every time a slot is mutated
//! its handles are re-indexed, so a gateway callback always reaches the one
//! slot that placed the order, or nobody.

use std::collections::HashMap;

use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::gateway::OrderGateway;
use super::ring::RingBuffer;
use super::slot::Slot;
use super::types::{
    GatewayEvent, OrderRef, OrderStateEvent, PriceLevels, Side, SlotId, SlotOutcome, SlotState,
    SlotStatus, TradeEvent,
};

/// Per-side slot counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSummary {
    pub idle: usize,
    pub pending_entry: usize,
    pub partially_filled: usize,
    pub open: usize,
    pub closing: usize,
    /// Filled volume currently held by the side
    pub exposure: Decimal,
}

impl SideSummary {
    pub fn busy(&self) -> usize {
        self.pending_entry + self.partially_filled + self.open + self.closing
    }
}

/// Counts per state per side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSummary {
    pub long: SideSummary,
    pub short: SideSummary,
}

/// A journal entry: which slot produced which outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub slot: SlotId,
    pub outcome: SlotOutcome,
}

#[derive(Debug)]
pub struct SlotPool {
    longs: Vec<Slot>,
    shorts: Vec<Slot>,
    routes: HashMap<OrderRef, SlotId>,
    journal: RingBuffer<JournalEntry>,
}

impl SlotPool {
    /// Create `slots_per_side` idle slots on each side
    pub fn new(slots_per_side: usize, min_trail_step: Decimal, journal_capacity: usize) -> Self {
        let build = |side| {
            (0..slots_per_side)
                .map(|index| Slot::new(side, index, min_trail_step))
                .collect::<Vec<_>>()
        };
        Self {
            longs: build(Side::Long),
            shorts: build(Side::Short),
            routes: HashMap::new(),
            journal: RingBuffer::with_capacity(journal_capacity),
        }
    }

    pub fn slots(&self, side: Side) -> &[Slot] {
        match side {
            Side::Long => &self.longs,
            Side::Short => &self.shorts,
        }
    }

    pub fn slot(&self, id: SlotId) -> Option<&Slot> {
        self.slots(id.side).get(id.index)
    }

    fn slot_mut(&mut self, id: SlotId) -> Option<&mut Slot> {
        match id.side {
            Side::Long => self.longs.get_mut(id.index),
            Side::Short => self.shorts.get_mut(id.index),
        }
    }

    /// All slots, longs first
    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.longs.iter().chain(self.shorts.iter())
    }

    /// Slot that owns `order_ref`, if any
    pub fn owner_of(&self, order_ref: OrderRef) -> Option<SlotId> {
        self.routes.get(&order_ref).copied()
    }

    pub fn busy_count(&self, side: Side) -> usize {
        self.slots(side).iter().filter(|s| s.state().is_busy()).count()
    }

    pub fn idle_count(&self, side: Side) -> usize {
        self.slots(side).len() - self.busy_count(side)
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Arm the first idle slot of `side`; false if every slot is busy
    pub fn arm<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        side: Side,
        volume: Decimal,
        levels: &PriceLevels,
    ) -> bool {
        let Some(id) = self.slots(side).iter().find(|s| s.is_idle()).map(|s| s.id()) else {
            debug!("No idle {} slot to arm", side);
            return false;
        };
        let armed = match self.slot_mut(id) {
            Some(slot) => slot.try_arm(gateway, levels, volume),
            None => false,
        };
        if armed {
            self.reindex(id);
        }
        armed
    }

    /// Dispatch a gateway event to the slot owning its handle
    pub fn route<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        event: &GatewayEvent,
    ) -> Option<SlotOutcome> {
        match event {
            GatewayEvent::Trade(trade) => self.route_trade(gateway, trade),
            GatewayEvent::OrderState(state) => self.route_order_state(gateway, state),
        }
    }

    pub fn route_trade<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        trade: &TradeEvent,
    ) -> Option<SlotOutcome> {
        let id = self.lookup(trade.order_ref)?;
        let outcome = self.slot_mut(id)?.on_trade(gateway, trade);
        self.after_mutation(id, outcome)
    }

    pub fn route_order_state<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        event: &OrderStateEvent,
    ) -> Option<SlotOutcome> {
        let id = self.lookup(event.order_ref)?;
        let outcome = self.slot_mut(id)?.on_order_state(gateway, event);
        self.after_mutation(id, outcome)
    }

    /// Request cancellation of every working entry, returns how many were asked
    pub fn expire_all<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G) -> usize {
        let ids: Vec<SlotId> = self.iter().map(|s| s.id()).collect();
        let mut expired = 0;
        for id in ids {
            let requested = self.slot_mut(id).is_some_and(|slot| slot.expire(gateway));
            if requested {
                expired += 1;
                self.record(id, SlotOutcome::StaleOrderExpired);
            }
        }
        if expired > 0 {
            info!("Expired {} pending entries", expired);
        }
        expired
    }

    /// Offer a stop candidate to every open slot of `side`
    pub fn trail<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G, side: Side, candidate: Decimal) -> usize {
        let ids: Vec<SlotId> = self
            .slots(side)
            .iter()
            .filter(|s| s.state() == SlotState::Open)
            .map(|s| s.id())
            .collect();
        let mut moved = 0;
        for id in ids {
            if self.slot_mut(id).is_some_and(|slot| slot.try_trail(gateway, candidate)) {
                moved += 1;
                self.reindex(id);
            }
        }
        moved
    }

    /// Cancel everything every slot holds
    pub fn release_all<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G) -> usize {
        let ids: Vec<SlotId> = self.iter().map(|s| s.id()).collect();
        let mut released = 0;
        for id in ids {
            if self.slot_mut(id).is_some_and(|slot| slot.release(gateway)) {
                released += 1;
            }
        }
        if released > 0 {
            info!("Released {} slots", released);
        }
        released
    }

    // ------------------------------------------------------------------
    // Monitoring
    // ------------------------------------------------------------------

    pub fn statuses(&self) -> Vec<SlotStatus> {
        self.iter().map(Slot::status).collect()
    }

    pub fn summary(&self) -> PoolSummary {
        let side_summary = |slots: &[Slot]| {
            let mut summary = SideSummary::default();
            for slot in slots {
                match slot.state() {
                    SlotState::Idle => summary.idle += 1,
                    SlotState::PendingEntry => summary.pending_entry += 1,
                    SlotState::PartiallyFilled => summary.partially_filled += 1,
                    SlotState::Open => summary.open += 1,
                    SlotState::Closing => summary.closing += 1,
                }
                summary.exposure += slot.filled_volume();
            }
            summary
        };
        PoolSummary {
            long: side_summary(&self.longs),
            short: side_summary(&self.shorts),
        }
    }

    /// Most recent outcomes, oldest first
    pub fn recent_outcomes(&self) -> impl Iterator<Item = &JournalEntry> {
        self.journal.iter()
    }

    pub fn last_outcome(&self) -> Option<&JournalEntry> {
        self.journal.latest()
    }

    /// No handle is owned by two slots and the routing map matches the slots
    pub fn has_exclusive_refs(&self) -> bool {
        let mut seen: HashMap<OrderRef, SlotId> = HashMap::new();
        for slot in self.iter() {
            for order_ref in slot.owned_refs() {
                if seen.insert(order_ref, slot.id()).is_some() {
                    return false;
                }
            }
        }
        seen == self.routes
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn lookup(&self, order_ref: OrderRef) -> Option<SlotId> {
        let id = self.routes.get(&order_ref).copied();
        if id.is_none() {
            debug!("Event for unknown order {} ignored", order_ref);
        }
        id
    }

    fn after_mutation(&mut self, id: SlotId, outcome: Option<SlotOutcome>) -> Option<SlotOutcome> {
        self.reindex(id);
        if let Some(outcome) = outcome {
            self.record(id, outcome);
        }
        outcome
    }

    fn record(&mut self, slot: SlotId, outcome: SlotOutcome) {
        debug!("[{}] outcome {:?}", slot, outcome);
        self.journal.push(JournalEntry { slot, outcome });
    }

    /// Refresh the routes of one slot from its current handles
    fn reindex(&mut self, id: SlotId) {
        self.routes.retain(|_, owner| *owner != id);
        let refs = self.slot(id).map(Slot::owned_refs).unwrap_or_default();
        for order_ref in refs {
            self.routes.insert(order_ref, id);
        }
    }
}
