//! Single ladder slot and its order lifecycle
//!
//! A slot owns at most one entry order. Once the entry has filled (fully, or
//! partially and then died) it owns exactly one stop and one take-profit
//! sized to the filled volume. Every transition is driven either by a pool
//! command (`try_arm`, `try_trail`, `expire`, `release`) or by a gateway
//! callback (`on_trade`, `on_order_state`).

use std::collections::HashSet;

use log::{debug, error, info, warn};
use rust_decimal::Decimal;

use super::gateway::OrderGateway;
use super::types::{
    OrderRef, OrderState, OrderStateEvent, PriceLevels, ProtectiveKind, Side, SlotId, SlotOutcome,
    SlotState, SlotStatus, TradeEvent, TradeId,
};

/// Times a lost protective leg is re-placed before the slot gives up on it
pub const MAX_PROTECTIVE_REPLACEMENTS: u32 = 3;

/// One position of the ladder
#[derive(Debug, Clone)]
pub struct Slot {
    side: Side,
    index: usize,
    state: SlotState,

    entry_ref: Option<OrderRef>,
    stop_ref: Option<OrderRef>,
    take_ref: Option<OrderRef>,

    requested_volume: Decimal,
    filled_volume: Decimal,
    /// Sum of entry trade volumes seen so far
    traded_volume: Decimal,

    entry_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    take_price: Option<Decimal>,

    /// Smallest stop improvement worth a cancel/replace
    min_trail_step: Decimal,

    applied_trades: HashSet<TradeId>,
    cancel_requested: bool,
    /// Completed entry order, still recognised for late callbacks
    retired_entry: Option<OrderRef>,
    /// Stops replaced by trailing whose cancel is not confirmed yet
    retired_stops: Vec<OrderRef>,
    /// Protective leg that executed while the slot was closing
    closing_executed: Option<ProtectiveKind>,
    /// Lost protective legs re-placed during this position
    replacements: u32,
}

impl Slot {
    pub fn new(side: Side, index: usize, min_trail_step: Decimal) -> Self {
        Self {
            side,
            index,
            state: SlotState::Idle,
            entry_ref: None,
            stop_ref: None,
            take_ref: None,
            requested_volume: Decimal::ZERO,
            filled_volume: Decimal::ZERO,
            traded_volume: Decimal::ZERO,
            entry_price: None,
            stop_price: None,
            take_price: None,
            min_trail_step,
            applied_trades: HashSet::new(),
            cancel_requested: false,
            retired_entry: None,
            retired_stops: Vec::new(),
            closing_executed: None,
            replacements: 0,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn id(&self) -> SlotId {
        SlotId {
            side: self.side,
            index: self.index,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> SlotState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == SlotState::Idle
    }

    pub fn entry_ref(&self) -> Option<OrderRef> {
        self.entry_ref
    }

    pub fn stop_ref(&self) -> Option<OrderRef> {
        self.stop_ref
    }

    pub fn take_ref(&self) -> Option<OrderRef> {
        self.take_ref
    }

    pub fn requested_volume(&self) -> Decimal {
        self.requested_volume
    }

    pub fn filled_volume(&self) -> Decimal {
        self.filled_volume
    }

    pub fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    pub fn take_price(&self) -> Option<Decimal> {
        self.take_price
    }

    pub fn entry_price(&self) -> Option<Decimal> {
        self.entry_price
    }

    /// Read-only view for monitoring
    pub fn status(&self) -> SlotStatus {
        SlotStatus {
            side: self.side,
            index: self.index,
            state: self.state,
            entry_price: self.entry_price,
            stop_price: self.stop_price,
            take_price: self.take_price,
            requested_volume: self.requested_volume,
            filled_volume: self.filled_volume,
        }
    }

    /// Every handle callbacks may still arrive for, live or retired
    pub fn owned_refs(&self) -> Vec<OrderRef> {
        let mut refs: Vec<OrderRef> = [self.entry_ref, self.stop_ref, self.take_ref, self.retired_entry]
            .into_iter()
            .flatten()
            .collect();
        refs.extend(self.retired_stops.iter().copied());
        refs
    }

    pub fn owns(&self, order_ref: OrderRef) -> bool {
        self.owned_refs().contains(&order_ref)
    }

    /// Check the reference layout matches the state
    ///
    /// Pending states hold only an entry; Open holds stop and take for a
    /// positive filled volume; Idle holds nothing at all.
    pub fn has_consistent_refs(&self) -> bool {
        let protectives = self.stop_ref.is_some() || self.take_ref.is_some();
        match self.state {
            SlotState::Idle => {
                self.entry_ref.is_none()
                    && !protectives
                    && self.retired_entry.is_none()
                    && self.retired_stops.is_empty()
                    && self.filled_volume.is_zero()
                    && self.entry_price.is_none()
                    && self.stop_price.is_none()
                    && self.take_price.is_none()
            }
            SlotState::PendingEntry => {
                self.entry_ref.is_some() && !protectives && self.filled_volume.is_zero()
            }
            SlotState::PartiallyFilled => {
                self.entry_ref.is_some() && !protectives && self.filled_volume > Decimal::ZERO
            }
            SlotState::Open => {
                self.entry_ref.is_none()
                    && self.stop_ref.is_some()
                    && self.take_ref.is_some()
                    && self.filled_volume > Decimal::ZERO
            }
            SlotState::Closing => self.entry_ref.is_none() && self.filled_volume > Decimal::ZERO,
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    /// Place the entry order if the slot is idle
    ///
    /// Returns false when the slot is busy, the levels belong to the other
    /// side or the volume is not positive. Nothing changes in that case.
    pub fn try_arm<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        levels: &PriceLevels,
        volume: Decimal,
    ) -> bool {
        if self.state != SlotState::Idle {
            return false;
        }
        if levels.side() != self.side {
            warn!("[{}] refusing {} levels", self.id(), levels.side());
            return false;
        }
        if volume <= Decimal::ZERO {
            warn!("[{}] refusing non-positive volume {}", self.id(), volume);
            return false;
        }

        let entry_ref = gateway.place_limit(self.side.entry_side(), levels.entry(), volume);
        self.entry_ref = Some(entry_ref);
        self.requested_volume = volume;
        self.entry_price = Some(levels.entry());
        self.stop_price = Some(levels.stop());
        self.take_price = Some(levels.take());
        self.state = SlotState::PendingEntry;

        info!(
            "[{}] armed {} @ {} (sl {}, tp {}) size {}",
            self.id(),
            entry_ref,
            levels.entry(),
            levels.stop(),
            levels.take(),
            volume
        );
        true
    }

    /// Move the stop to `candidate` if that tightens it by at least the minimum step
    pub fn try_trail<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G, candidate: Decimal) -> bool {
        if self.state != SlotState::Open || candidate <= Decimal::ZERO {
            return false;
        }
        let (Some(current), Some(old_ref)) = (self.stop_price, self.stop_ref) else {
            return false;
        };
        if !self.side.is_tighter(candidate, current)
            || self.side.improvement(candidate, current) < self.min_trail_step
        {
            return false;
        }
        // The stop may never cross the take-profit
        if let Some(take) = self.take_price {
            if !self.side.is_tighter(take, candidate) {
                return false;
            }
        }

        gateway.cancel(old_ref);
        self.retired_stops.push(old_ref);
        let new_ref = gateway.place_stop(self.side.exit_side(), candidate, self.filled_volume);
        self.stop_ref = Some(new_ref);
        self.stop_price = Some(candidate);

        info!(
            "[{}] trailed stop {} -> {} ({} replaces {})",
            self.id(),
            current,
            candidate,
            new_ref,
            old_ref
        );
        true
    }

    /// Request cancellation of a working entry
    ///
    /// Idempotent: a second call before the cancel callback does nothing.
    pub fn expire<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G) -> bool {
        if !self.state.is_pending() || self.cancel_requested {
            return false;
        }
        let Some(entry_ref) = self.entry_ref else {
            return false;
        };

        gateway.cancel(entry_ref);
        self.cancel_requested = true;
        debug!("[{}] cancel requested for entry {}", self.id(), entry_ref);
        true
    }

    /// Manual cancellation of whatever the slot holds
    ///
    /// Pending slots cancel their entry. Open slots cancel both protective
    /// orders and wait in `Closing` for the confirmations.
    pub fn release<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G) -> bool {
        match self.state {
            SlotState::PendingEntry | SlotState::PartiallyFilled => self.expire(gateway),
            SlotState::Open => {
                for order_ref in [self.stop_ref, self.take_ref].into_iter().flatten() {
                    gateway.cancel(order_ref);
                }
                self.state = SlotState::Closing;
                info!("[{}] releasing protective orders", self.id());
                true
            }
            SlotState::Idle | SlotState::Closing => false,
        }
    }

    // ------------------------------------------------------------------
    // Gateway callbacks
    // ------------------------------------------------------------------

    /// Apply an execution report
    pub fn on_trade<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        trade: &TradeEvent,
    ) -> Option<SlotOutcome> {
        if !self.applied_trades.insert(trade.trade_id) {
            debug!("[{}] duplicate trade {:?} ignored", self.id(), trade.trade_id);
            return Some(SlotOutcome::DuplicateEventIgnored {
                trade_id: trade.trade_id,
            });
        }

        let order_ref = trade.order_ref;
        if self.entry_ref == Some(order_ref) {
            self.traded_volume += trade.volume;
            self.raise_filled(self.traded_volume);
            debug!(
                "[{}] entry fill {} @ {} (filled {}/{})",
                self.id(),
                trade.volume,
                trade.price,
                self.filled_volume,
                self.requested_volume
            );

            if self.filled_volume >= self.requested_volume {
                return self.complete_entry(gateway).then_some(SlotOutcome::EntryFilled {
                    volume: self.filled_volume,
                });
            }
            if self.state == SlotState::PendingEntry && self.filled_volume > Decimal::ZERO {
                self.state = SlotState::PartiallyFilled;
            }
            return None;
        }

        if self.retired_entry == Some(order_ref) {
            debug!("[{}] late trade on completed entry {} absorbed", self.id(), order_ref);
        } else {
            // Protective exits are driven by their order-state event
            debug!(
                "[{}] protective fill {} @ {} on {}",
                self.id(),
                trade.volume,
                trade.price,
                order_ref
            );
        }
        None
    }

    /// Apply an order state change
    pub fn on_order_state<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        event: &OrderStateEvent,
    ) -> Option<SlotOutcome> {
        let order_ref = event.order_ref;
        if self.entry_ref == Some(order_ref) {
            self.on_entry_state(gateway, event)
        } else if self.stop_ref == Some(order_ref) {
            self.on_protective_state(gateway, ProtectiveKind::Stop, event.state)
        } else if self.take_ref == Some(order_ref) {
            self.on_protective_state(gateway, ProtectiveKind::TakeProfit, event.state)
        } else if self.retired_stops.contains(&order_ref) {
            self.on_retired_stop_state(gateway, order_ref, event.state)
        } else {
            if self.retired_entry == Some(order_ref) {
                debug!("[{}] {:?} on completed entry {}", self.id(), event.state, order_ref);
            }
            None
        }
    }

    fn on_entry_state<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        event: &OrderStateEvent,
    ) -> Option<SlotOutcome> {
        // The remaining balance is ground truth for what has been filled
        let remaining = event.remaining_balance.max(Decimal::ZERO);
        self.raise_filled(self.requested_volume - remaining);

        match event.state {
            OrderState::Active => {
                if self.filled_volume >= self.requested_volume {
                    return self.complete_entry(gateway).then_some(SlotOutcome::EntryFilled {
                        volume: self.filled_volume,
                    });
                }
                if self.state == SlotState::PendingEntry && self.filled_volume > Decimal::ZERO {
                    self.state = SlotState::PartiallyFilled;
                }
                None
            }
            OrderState::Done => {
                if self.filled_volume > Decimal::ZERO {
                    let volume = self.filled_volume;
                    self.complete_entry(gateway)
                        .then_some(SlotOutcome::EntryFilled { volume })
                } else {
                    warn!("[{}] entry reported done with nothing filled", self.id());
                    self.reset();
                    Some(SlotOutcome::CancelledBeforeFill)
                }
            }
            OrderState::Cancelled | OrderState::Rejected => {
                if self.filled_volume > Decimal::ZERO {
                    let filled = self.filled_volume;
                    info!(
                        "[{}] entry {:?} after partial fill {}/{}",
                        self.id(),
                        event.state,
                        filled,
                        self.requested_volume
                    );
                    self.complete_entry(gateway)
                        .then_some(SlotOutcome::CancelledAfterPartialFill { filled })
                } else {
                    let outcome = if event.state == OrderState::Rejected {
                        warn!("[{}] entry rejected", self.id());
                        SlotOutcome::RejectedEntry
                    } else {
                        info!("[{}] entry cancelled before any fill", self.id());
                        SlotOutcome::CancelledBeforeFill
                    };
                    self.reset();
                    Some(outcome)
                }
            }
        }
    }

    fn on_protective_state<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        kind: ProtectiveKind,
        state: OrderState,
    ) -> Option<SlotOutcome> {
        if !state.is_terminal() {
            return None;
        }

        if self.state == SlotState::Closing {
            self.clear_protective(kind);
            if state == OrderState::Done {
                self.closing_executed = Some(kind);
            }
            return self.finish_closing();
        }

        let volume = self.filled_volume;
        self.clear_protective(kind);

        if state == OrderState::Done {
            self.cancel_protectives(gateway);
            self.reset();
            info!("[{}] {:?} executed for {}", self.id(), kind, volume);
            return Some(SlotOutcome::ProtectiveOrderExecuted { kind, volume });
        }

        // The position is still held: the surviving leg stays live
        warn!("[{}] {:?} {:?} unexpectedly with {} held", self.id(), kind, state, volume);
        if self.replacements < MAX_PROTECTIVE_REPLACEMENTS && self.replace_protective(gateway, kind) {
            self.replacements += 1;
        } else {
            error!(
                "[{}] {:?} cannot be restored, closing on the remaining leg",
                self.id(),
                kind
            );
            self.state = SlotState::Closing;
        }
        Some(SlotOutcome::ProtectionLost { kind, volume })
    }

    fn on_retired_stop_state<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        order_ref: OrderRef,
        state: OrderState,
    ) -> Option<SlotOutcome> {
        if !state.is_terminal() {
            return None;
        }
        self.retired_stops.retain(|r| *r != order_ref);
        if state != OrderState::Done {
            return None;
        }

        // The replaced stop triggered before its cancel landed
        if self.state == SlotState::Closing {
            self.closing_executed = Some(ProtectiveKind::Stop);
            return self.finish_closing();
        }

        let volume = self.filled_volume;
        warn!("[{}] replaced stop {} executed before cancel", self.id(), order_ref);
        self.cancel_protectives(gateway);
        self.reset();
        Some(SlotOutcome::ProtectiveOrderExecuted {
            kind: ProtectiveKind::Stop,
            volume,
        })
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn raise_filled(&mut self, candidate: Decimal) {
        let capped = candidate.min(self.requested_volume);
        if capped > self.filled_volume {
            self.filled_volume = capped;
        }
    }

    /// Retire the entry and place stop and take for the filled volume
    fn complete_entry<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G) -> bool {
        let (Some(stop), Some(take)) = (self.stop_price, self.take_price) else {
            warn!("[{}] entry completed without protective targets", self.id());
            return false;
        };

        self.retired_entry = self.entry_ref.take();
        self.cancel_requested = false;

        let exit = self.side.exit_side();
        self.stop_ref = Some(gateway.place_stop(exit, stop, self.filled_volume));
        self.take_ref = Some(gateway.place_take_profit(exit, take, self.filled_volume));
        self.state = SlotState::Open;

        info!(
            "[{}] open {} (sl {}, tp {})",
            self.id(),
            self.filled_volume,
            stop,
            take
        );
        true
    }

    /// Place a fresh order for a lost leg at its current price
    fn replace_protective<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G, kind: ProtectiveKind) -> bool {
        let exit = self.side.exit_side();
        let volume = self.filled_volume;
        let new_ref = match (kind, self.stop_price, self.take_price) {
            (ProtectiveKind::Stop, Some(price), _) => {
                let order_ref = gateway.place_stop(exit, price, volume);
                self.stop_ref = Some(order_ref);
                order_ref
            }
            (ProtectiveKind::TakeProfit, _, Some(price)) => {
                let order_ref = gateway.place_take_profit(exit, price, volume);
                self.take_ref = Some(order_ref);
                order_ref
            }
            _ => return false,
        };
        info!("[{}] {:?} re-placed as {} for {}", self.id(), kind, new_ref, volume);
        true
    }

    fn clear_protective(&mut self, kind: ProtectiveKind) {
        match kind {
            ProtectiveKind::Stop => self.stop_ref = None,
            ProtectiveKind::TakeProfit => self.take_ref = None,
        }
    }

    fn cancel_protectives<G: OrderGateway + ?Sized>(&mut self, gateway: &mut G) {
        for order_ref in [self.stop_ref.take(), self.take_ref.take()].into_iter().flatten() {
            gateway.cancel(order_ref);
        }
    }

    fn finish_closing(&mut self) -> Option<SlotOutcome> {
        if self.stop_ref.is_some() || self.take_ref.is_some() {
            return None;
        }
        let volume = self.filled_volume;
        let outcome = match self.closing_executed {
            Some(kind) => SlotOutcome::ProtectiveOrderExecuted { kind, volume },
            None => SlotOutcome::ProtectionWithdrawn { volume },
        };
        info!("[{}] released: {:?}", self.id(), outcome);
        self.reset();
        Some(outcome)
    }

    /// Back to Idle with every field cleared
    fn reset(&mut self) {
        self.state = SlotState::Idle;
        self.entry_ref = None;
        self.stop_ref = None;
        self.take_ref = None;
        self.requested_volume = Decimal::ZERO;
        self.filled_volume = Decimal::ZERO;
        self.traded_volume = Decimal::ZERO;
        self.entry_price = None;
        self.stop_price = None;
        self.take_price = None;
        self.applied_trades.clear();
        self.cancel_requested = false;
        self.retired_entry = None;
        self.retired_stops.clear();
        self.closing_executed = None;
        self.replacements = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::gateway::mock::MockGateway;
    use crate::ladder::types::{OrderKind, OrderSide};
    use rust_decimal_macros::dec;

    fn long_levels() -> PriceLevels {
        PriceLevels::new(Side::Long, dec!(1.2000), dec!(1.1950), dec!(1.2100)).unwrap()
    }

    fn short_levels() -> PriceLevels {
        PriceLevels::new(Side::Short, dec!(1.2000), dec!(1.2050), dec!(1.1900)).unwrap()
    }

    fn trade(order_ref: OrderRef, id: u64, volume: Decimal) -> TradeEvent {
        TradeEvent {
            order_ref,
            trade_id: TradeId(id),
            volume,
            price: dec!(1.2000),
        }
    }

    fn state(order_ref: OrderRef, state: OrderState, remaining: Decimal) -> OrderStateEvent {
        OrderStateEvent {
            order_ref,
            state,
            remaining_balance: remaining,
        }
    }

    fn open_long(gateway: &mut MockGateway) -> Slot {
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));
        assert!(slot.try_arm(gateway, &long_levels(), dec!(1)));
        let entry = slot.entry_ref().unwrap();
        slot.on_trade(gateway, &trade(entry, 1, dec!(1)));
        assert_eq!(slot.state(), SlotState::Open);
        slot
    }

    #[test]
    fn test_arm_places_entry_only() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));

        assert!(slot.try_arm(&mut gateway, &long_levels(), dec!(1)));
        assert_eq!(slot.state(), SlotState::PendingEntry);
        assert_eq!(gateway.placed.len(), 1);

        let entry = gateway.last_of(OrderKind::Limit).unwrap();
        assert_eq!(entry.side, OrderSide::Buy);
        assert_eq!(entry.price, dec!(1.2000));
        assert!(slot.stop_ref().is_none());
        assert_eq!(slot.stop_price(), Some(dec!(1.1950)));
        assert!(slot.has_consistent_refs());
    }

    #[test]
    fn test_full_fill_opens_with_protectives() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));
        slot.try_arm(&mut gateway, &long_levels(), dec!(1));
        let entry = slot.entry_ref().unwrap();

        let outcome = slot.on_trade(&mut gateway, &trade(entry, 1, dec!(1)));

        assert_eq!(outcome, Some(SlotOutcome::EntryFilled { volume: dec!(1) }));
        assert_eq!(slot.state(), SlotState::Open);
        let stop = gateway.last_of(OrderKind::Stop).unwrap();
        let take = gateway.last_of(OrderKind::TakeProfit).unwrap();
        assert_eq!((stop.side, stop.price, stop.volume), (OrderSide::Sell, dec!(1.1950), dec!(1)));
        assert_eq!((take.side, take.price, take.volume), (OrderSide::Sell, dec!(1.2100), dec!(1)));
        assert!(slot.has_consistent_refs());
    }

    #[test]
    fn test_arm_is_noop_when_busy() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));
        assert!(slot.try_arm(&mut gateway, &long_levels(), dec!(1)));

        assert!(!slot.try_arm(&mut gateway, &long_levels(), dec!(2)));
        assert_eq!(gateway.placed.len(), 1);
        assert_eq!(slot.requested_volume(), dec!(1));
    }

    #[test]
    fn test_arm_rejects_wrong_side_and_zero_volume() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));

        assert!(!slot.try_arm(&mut gateway, &short_levels(), dec!(1)));
        assert!(!slot.try_arm(&mut gateway, &long_levels(), dec!(0)));
        assert!(gateway.placed.is_empty());
        assert!(slot.is_idle());
    }

    #[test]
    fn test_duplicate_trade_is_ignored() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));
        slot.try_arm(&mut gateway, &long_levels(), dec!(1));
        let entry = slot.entry_ref().unwrap();

        assert_eq!(slot.on_trade(&mut gateway, &trade(entry, 7, dec!(0.3))), None);
        let dup = slot.on_trade(&mut gateway, &trade(entry, 7, dec!(0.3)));

        assert_eq!(dup, Some(SlotOutcome::DuplicateEventIgnored { trade_id: TradeId(7) }));
        assert_eq!(slot.filled_volume(), dec!(0.3));
        assert_eq!(slot.state(), SlotState::PartiallyFilled);
    }

    #[test]
    fn test_partial_then_cancel_protects_filled_volume() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));
        slot.try_arm(&mut gateway, &long_levels(), dec!(1));
        let entry = slot.entry_ref().unwrap();

        slot.on_trade(&mut gateway, &trade(entry, 1, dec!(0.4)));
        assert_eq!(slot.state(), SlotState::PartiallyFilled);

        let outcome = slot.on_order_state(&mut gateway, &state(entry, OrderState::Cancelled, dec!(0.6)));

        assert_eq!(outcome, Some(SlotOutcome::CancelledAfterPartialFill { filled: dec!(0.4) }));
        assert_eq!(slot.state(), SlotState::Open);
        assert_eq!(gateway.last_of(OrderKind::Stop).unwrap().volume, dec!(0.4));
        assert_eq!(gateway.last_of(OrderKind::TakeProfit).unwrap().volume, dec!(0.4));
    }

    #[test]
    fn test_remaining_balance_is_ground_truth() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Short, 0, dec!(0.0005));
        slot.try_arm(&mut gateway, &short_levels(), dec!(2));
        let entry = slot.entry_ref().unwrap();

        // Trade report lost, order state says 0.5 is done
        slot.on_order_state(&mut gateway, &state(entry, OrderState::Active, dec!(1.5)));
        assert_eq!(slot.filled_volume(), dec!(0.5));
        assert_eq!(slot.state(), SlotState::PartiallyFilled);

        // A late trade for the same fill must not double count
        slot.on_trade(&mut gateway, &trade(entry, 3, dec!(0.5)));
        assert_eq!(slot.filled_volume(), dec!(0.5));

        let outcome = slot.on_order_state(&mut gateway, &state(entry, OrderState::Done, dec!(0)));
        assert_eq!(outcome, Some(SlotOutcome::EntryFilled { volume: dec!(2) }));
        assert_eq!(gateway.last_of(OrderKind::Stop).unwrap().side, OrderSide::Buy);
    }

    #[test]
    fn test_rejected_and_cancelled_entry_go_idle() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));

        slot.try_arm(&mut gateway, &long_levels(), dec!(1));
        let entry = slot.entry_ref().unwrap();
        let outcome = slot.on_order_state(&mut gateway, &state(entry, OrderState::Rejected, dec!(1)));
        assert_eq!(outcome, Some(SlotOutcome::RejectedEntry));
        assert!(slot.is_idle());
        assert!(slot.has_consistent_refs());

        slot.try_arm(&mut gateway, &long_levels(), dec!(1));
        let entry = slot.entry_ref().unwrap();
        let outcome = slot.on_order_state(&mut gateway, &state(entry, OrderState::Cancelled, dec!(1)));
        assert_eq!(outcome, Some(SlotOutcome::CancelledBeforeFill));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_trailing_respects_min_step() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let first_stop = slot.stop_ref().unwrap();

        assert!(slot.try_trail(&mut gateway, dec!(1.1960)));
        assert_eq!(slot.stop_price(), Some(dec!(1.1960)));
        assert!(gateway.was_cancelled(first_stop));

        assert!(!slot.try_trail(&mut gateway, dec!(1.1962)));
        assert!(!slot.try_trail(&mut gateway, dec!(1.1900)));
        assert_eq!(slot.stop_price(), Some(dec!(1.1960)));
        assert_eq!(gateway.count_of(OrderKind::Stop), 2);
    }

    #[test]
    fn test_trailing_never_crosses_take() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);

        assert!(!slot.try_trail(&mut gateway, dec!(1.2100)));
        assert!(!slot.try_trail(&mut gateway, dec!(1.2200)));
        assert_eq!(slot.stop_price(), Some(dec!(1.1950)));
    }

    #[test]
    fn test_stop_done_cancels_take_and_resets() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let stop = slot.stop_ref().unwrap();
        let take = slot.take_ref().unwrap();

        let outcome = slot.on_order_state(&mut gateway, &state(stop, OrderState::Done, dec!(0)));

        assert_eq!(
            outcome,
            Some(SlotOutcome::ProtectiveOrderExecuted {
                kind: ProtectiveKind::Stop,
                volume: dec!(1)
            })
        );
        assert!(gateway.was_cancelled(take));
        assert!(slot.is_idle());
        assert_eq!(slot.entry_price(), None);
        assert_eq!(slot.stop_price(), None);
        assert_eq!(slot.take_price(), None);
        assert!(slot.owned_refs().is_empty());
    }

    #[test]
    fn test_stop_rejected_is_replaced_and_take_kept() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let stop = slot.stop_ref().unwrap();
        let take = slot.take_ref().unwrap();

        let outcome = slot.on_order_state(&mut gateway, &state(stop, OrderState::Rejected, dec!(1)));

        assert_eq!(
            outcome,
            Some(SlotOutcome::ProtectionLost {
                kind: ProtectiveKind::Stop,
                volume: dec!(1)
            })
        );
        assert_eq!(slot.state(), SlotState::Open);
        assert_eq!(slot.filled_volume(), dec!(1));
        assert!(!gateway.was_cancelled(take));
        assert_eq!(slot.take_ref(), Some(take));

        let new_stop = slot.stop_ref().unwrap();
        assert_ne!(new_stop, stop);
        let placed = gateway.find(new_stop).unwrap();
        assert_eq!((placed.kind, placed.price, placed.volume), (OrderKind::Stop, dec!(1.1950), dec!(1)));
        assert!(slot.has_consistent_refs());

        // Still busy, so it cannot be armed again
        assert!(!slot.try_arm(&mut gateway, &long_levels(), dec!(1)));
    }

    #[test]
    fn test_take_cancelled_is_replaced_and_stop_kept() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Short, 0, dec!(0.0005));
        slot.try_arm(&mut gateway, &short_levels(), dec!(2));
        let entry = slot.entry_ref().unwrap();
        slot.on_trade(&mut gateway, &trade(entry, 1, dec!(2)));
        let stop = slot.stop_ref().unwrap();
        let take = slot.take_ref().unwrap();

        let outcome = slot.on_order_state(&mut gateway, &state(take, OrderState::Cancelled, dec!(2)));

        assert_eq!(
            outcome,
            Some(SlotOutcome::ProtectionLost {
                kind: ProtectiveKind::TakeProfit,
                volume: dec!(2)
            })
        );
        assert_eq!(slot.state(), SlotState::Open);
        assert!(gateway.cancelled.is_empty());
        assert_eq!(slot.stop_ref(), Some(stop));
        let placed = gateway.find(slot.take_ref().unwrap()).unwrap();
        assert_eq!(
            (placed.kind, placed.side, placed.price, placed.volume),
            (OrderKind::TakeProfit, OrderSide::Buy, dec!(1.1900), dec!(2))
        );
    }

    #[test]
    fn test_repeatedly_lost_leg_closes_on_surviving_leg() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let take = slot.take_ref().unwrap();

        for _ in 0..MAX_PROTECTIVE_REPLACEMENTS {
            let stop = slot.stop_ref().unwrap();
            slot.on_order_state(&mut gateway, &state(stop, OrderState::Rejected, dec!(1)));
            assert_eq!(slot.state(), SlotState::Open);
        }
        let stop = slot.stop_ref().unwrap();
        slot.on_order_state(&mut gateway, &state(stop, OrderState::Rejected, dec!(1)));

        assert_eq!(slot.state(), SlotState::Closing);
        assert_eq!(slot.filled_volume(), dec!(1));
        assert_eq!(slot.take_ref(), Some(take));
        assert!(!gateway.was_cancelled(take));
        assert!(slot.has_consistent_refs());

        // The surviving take still closes the position
        let outcome = slot.on_order_state(&mut gateway, &state(take, OrderState::Done, dec!(0)));
        assert_eq!(
            outcome,
            Some(SlotOutcome::ProtectiveOrderExecuted {
                kind: ProtectiveKind::TakeProfit,
                volume: dec!(1)
            })
        );
        assert!(slot.is_idle());
    }

    #[test]
    fn test_replaced_stop_executing_closes_slot() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let old_stop = slot.stop_ref().unwrap();
        slot.try_trail(&mut gateway, dec!(1.1970));
        let new_stop = slot.stop_ref().unwrap();
        let take = slot.take_ref().unwrap();

        let outcome = slot.on_order_state(&mut gateway, &state(old_stop, OrderState::Done, dec!(0)));

        assert!(matches!(
            outcome,
            Some(SlotOutcome::ProtectiveOrderExecuted {
                kind: ProtectiveKind::Stop,
                ..
            })
        ));
        assert!(gateway.was_cancelled(new_stop));
        assert!(gateway.was_cancelled(take));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_replaced_stop_cancel_is_forgotten() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let old_stop = slot.stop_ref().unwrap();
        slot.try_trail(&mut gateway, dec!(1.1970));
        assert!(slot.owns(old_stop));

        let outcome = slot.on_order_state(&mut gateway, &state(old_stop, OrderState::Cancelled, dec!(1)));

        assert_eq!(outcome, None);
        assert!(!slot.owns(old_stop));
        assert_eq!(slot.state(), SlotState::Open);
    }

    #[test]
    fn test_expire_is_idempotent() {
        let mut gateway = MockGateway::new();
        let mut slot = Slot::new(Side::Long, 0, dec!(0.0005));
        slot.try_arm(&mut gateway, &long_levels(), dec!(1));
        let entry = slot.entry_ref().unwrap();

        assert!(slot.expire(&mut gateway));
        assert!(!slot.expire(&mut gateway));
        assert_eq!(gateway.cancelled, vec![entry]);

        slot.on_order_state(&mut gateway, &state(entry, OrderState::Cancelled, dec!(1)));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_expire_leaves_open_slot_alone() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);

        assert!(!slot.expire(&mut gateway));
        assert!(gateway.cancelled.is_empty());
        assert_eq!(slot.state(), SlotState::Open);
    }

    #[test]
    fn test_release_withdraws_protection() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let stop = slot.stop_ref().unwrap();
        let take = slot.take_ref().unwrap();

        assert!(slot.release(&mut gateway));
        assert_eq!(slot.state(), SlotState::Closing);
        assert!(!slot.release(&mut gateway));

        assert_eq!(slot.on_order_state(&mut gateway, &state(stop, OrderState::Cancelled, dec!(1))), None);
        let outcome = slot.on_order_state(&mut gateway, &state(take, OrderState::Cancelled, dec!(1)));

        assert_eq!(outcome, Some(SlotOutcome::ProtectionWithdrawn { volume: dec!(1) }));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_release_race_with_take_execution() {
        let mut gateway = MockGateway::new();
        let mut slot = open_long(&mut gateway);
        let stop = slot.stop_ref().unwrap();
        let take = slot.take_ref().unwrap();
        slot.release(&mut gateway);

        slot.on_order_state(&mut gateway, &state(take, OrderState::Done, dec!(0)));
        let outcome = slot.on_order_state(&mut gateway, &state(stop, OrderState::Cancelled, dec!(1)));

        assert_eq!(
            outcome,
            Some(SlotOutcome::ProtectiveOrderExecuted {
                kind: ProtectiveKind::TakeProfit,
                volume: dec!(1)
            })
        );
    }
}
