//! LadderListener trait definition
//!
//! One callback per event kind the ladder reacts to. The runner owns a
//! listener and invokes these synchronously, one event at a time.

use rust_decimal::Decimal;

use super::types::{LevelUpdate, OrderStateEvent, TradeEvent};

/// Lifecycle callbacks driving a ladder
pub trait LadderListener {
    /// Called once before the first event
    fn on_started(&mut self);

    /// Called for every level push from the level provider
    fn on_level_update(&mut self, update: &LevelUpdate);

    /// Called for every last-traded price seen on the market feed
    ///
    /// Default: ignore prices.
    fn on_market_price(&mut self, _price: Decimal) {}

    /// Called for every execution report from the gateway
    fn on_trade(&mut self, trade: &TradeEvent);

    /// Called for every order state change from the gateway
    fn on_order_state(&mut self, event: &OrderStateEvent);

    /// Called on every session timer tick
    fn on_tick(&mut self);

    /// Called once when the runner shuts down
    fn on_stopped(&mut self);
}

/// A no-op listener for testing or dry wiring
#[derive(Debug, Default)]
pub struct NoOpListener;

impl LadderListener for NoOpListener {
    fn on_started(&mut self) {}

    fn on_level_update(&mut self, _update: &LevelUpdate) {}

    fn on_trade(&mut self, _trade: &TradeEvent) {}

    fn on_order_state(&mut self, _event: &OrderStateEvent) {}

    fn on_tick(&mut self) {}

    fn on_stopped(&mut self) {}
}
