//! Paper trading gateway
//!
//! Simulates order execution locally by checking marked prices against
//! working orders. Every acceptance, fill and cancel is reported on an
//! unbounded channel as a [`GatewayEvent`], exactly as a live venue would
//! report them asynchronously.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::gateway::OrderGateway;
use super::types::{
    GatewayEvent, OrderKind, OrderRef, OrderSide, OrderState, OrderStateEvent, TradeEvent, TradeId,
};

/// Paper venue behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Fill limits when the price touches the limit, not only when it trades through
    #[serde(default = "default_fill_on_touch")]
    pub fill_on_touch: bool,

    /// Cap on the volume a limit order fills per price tick (partial fills)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fill_volume: Option<Decimal>,
}

fn default_fill_on_touch() -> bool {
    true
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            fill_on_touch: default_fill_on_touch(),
            max_fill_volume: None,
        }
    }
}

/// Internal order tracking for paper trading
#[derive(Debug, Clone)]
struct PaperOrder {
    kind: OrderKind,
    side: OrderSide,
    price: Decimal,
    volume: Decimal,
    filled: Decimal,
}

impl PaperOrder {
    fn remaining(&self) -> Decimal {
        self.volume - self.filled
    }

    /// Check if this order should execute at the given market price
    fn should_fill(&self, market: Decimal, fill_on_touch: bool) -> bool {
        let at_or_below = |level: Decimal| {
            if fill_on_touch {
                market <= level
            } else {
                market < level
            }
        };
        let at_or_above = |level: Decimal| {
            if fill_on_touch {
                market >= level
            } else {
                market > level
            }
        };

        match (self.kind, self.side) {
            // Resting orders execute when the market comes to them
            (OrderKind::Limit | OrderKind::TakeProfit, OrderSide::Buy) => at_or_below(self.price),
            (OrderKind::Limit | OrderKind::TakeProfit, OrderSide::Sell) => at_or_above(self.price),
            // Stops trigger when the market runs through them; touch always triggers
            (OrderKind::Stop, OrderSide::Buy) => market >= self.price,
            (OrderKind::Stop, OrderSide::Sell) => market <= self.price,
        }
    }

    /// Stops execute at market, resting orders at their own price
    fn fill_price(&self, market: Decimal) -> Decimal {
        match self.kind {
            OrderKind::Stop => market,
            OrderKind::Limit | OrderKind::TakeProfit => self.price,
        }
    }
}

/// Paper trading position tracking
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperPosition {
    /// Position size (positive = long, negative = short)
    pub size: Decimal,
    /// Average entry price
    pub entry_price: Decimal,
    /// Realized PnL in price units times volume
    pub realized_pnl: Decimal,
}

impl PaperPosition {
    /// Update position after a fill
    fn apply_fill(&mut self, qty: Decimal, price: Decimal, is_buy: bool) {
        let signed_qty = if is_buy { qty } else { -qty };

        if self.size.is_zero() {
            // Opening new position
            self.size = signed_qty;
            self.entry_price = price;
        } else if (self.size > Decimal::ZERO) == is_buy {
            // Adding to position
            let total_value = self.entry_price * self.size.abs() + price * qty;
            self.size += signed_qty;
            self.entry_price = total_value / self.size.abs();
        } else {
            // Reducing, closing or flipping
            let close_qty = qty.min(self.size.abs());
            let pnl = if self.size > Decimal::ZERO {
                (price - self.entry_price) * close_qty
            } else {
                (self.entry_price - price) * close_qty
            };
            self.realized_pnl += pnl;
            self.size += signed_qty;

            if self.size.is_zero() {
                self.entry_price = Decimal::ZERO;
            } else if qty > close_qty {
                // Flipped: the excess opens at this price
                self.entry_price = price;
            }
        }
    }

    /// Calculate unrealized PnL at current price
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        if self.size > Decimal::ZERO {
            (current_price - self.entry_price) * self.size
        } else {
            (self.entry_price - current_price) * self.size.abs()
        }
    }
}

/// Local matching venue
pub struct PaperGateway {
    config: PaperConfig,
    /// Working orders only; terminal orders are dropped
    orders: BTreeMap<OrderRef, PaperOrder>,
    events: UnboundedSender<GatewayEvent>,
    next_ref: u64,
    next_trade: u64,
    last_price: Option<Decimal>,
    position: PaperPosition,
}

impl PaperGateway {
    pub fn new(config: PaperConfig, events: UnboundedSender<GatewayEvent>) -> Self {
        Self {
            config,
            orders: BTreeMap::new(),
            events,
            next_ref: 0,
            next_trade: 0,
            last_price: None,
            position: PaperPosition::default(),
        }
    }

    /// Gateway plus the receiving end of its event channel
    pub fn channel(config: PaperConfig) -> (Self, UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(config, tx), rx)
    }

    pub fn position(&self) -> PaperPosition {
        self.position
    }

    pub fn last_price(&self) -> Option<Decimal> {
        self.last_price
    }

    /// Number of working orders
    pub fn open_orders(&self) -> usize {
        self.orders.len()
    }

    fn place(&mut self, kind: OrderKind, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
        self.next_ref += 1;
        let order_ref = OrderRef(self.next_ref);
        self.orders.insert(
            order_ref,
            PaperOrder {
                kind,
                side,
                price,
                volume,
                filled: Decimal::ZERO,
            },
        );
        debug!("Paper {:?} {:?} {} @ {} accepted as {}", kind, side, volume, price, order_ref);
        self.emit_state(order_ref, OrderState::Active, volume);

        // Marketable on arrival
        if let Some(market) = self.last_price {
            if self.is_fillable(order_ref, market) {
                self.execute(order_ref, market);
            }
        }
        order_ref
    }

    fn is_fillable(&self, order_ref: OrderRef, market: Decimal) -> bool {
        self.orders
            .get(&order_ref)
            .is_some_and(|order| order.should_fill(market, self.config.fill_on_touch))
    }

    /// Execute a simulated fill
    fn execute(&mut self, order_ref: OrderRef, market: Decimal) {
        let Some(order) = self.orders.get_mut(&order_ref) else {
            return;
        };

        let mut qty = order.remaining();
        if order.kind == OrderKind::Limit {
            if let Some(cap) = self.config.max_fill_volume {
                qty = qty.min(cap);
            }
        }
        if qty <= Decimal::ZERO {
            return;
        }

        let price = order.fill_price(market);
        order.filled += qty;
        let remaining = order.remaining();
        let is_buy = order.side == OrderSide::Buy;
        let kind = order.kind;

        self.next_trade += 1;
        self.position.apply_fill(qty, price, is_buy);
        info!(
            "Paper fill {:?} {} {} @ {} (remaining {})",
            kind, order_ref, qty, price, remaining
        );
        self.emit(GatewayEvent::Trade(TradeEvent {
            order_ref,
            trade_id: TradeId(self.next_trade),
            volume: qty,
            price,
        }));

        if remaining.is_zero() {
            self.orders.remove(&order_ref);
            self.emit_state(order_ref, OrderState::Done, Decimal::ZERO);
        } else {
            self.emit_state(order_ref, OrderState::Active, remaining);
        }
    }

    fn emit_state(&self, order_ref: OrderRef, state: OrderState, remaining_balance: Decimal) {
        self.emit(GatewayEvent::OrderState(OrderStateEvent {
            order_ref,
            state,
            remaining_balance,
        }));
    }

    fn emit(&self, event: GatewayEvent) {
        if self.events.send(event).is_err() {
            warn!("Gateway event receiver dropped, {:?} lost", event);
        }
    }
}

impl OrderGateway for PaperGateway {
    fn place_limit(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
        self.place(OrderKind::Limit, side, price, volume)
    }

    fn place_stop(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
        self.place(OrderKind::Stop, side, price, volume)
    }

    fn place_take_profit(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
        self.place(OrderKind::TakeProfit, side, price, volume)
    }

    fn cancel(&mut self, order: OrderRef) {
        match self.orders.remove(&order) {
            Some(paper) => {
                debug!("Paper cancel {}", order);
                self.emit_state(order, OrderState::Cancelled, paper.remaining());
            }
            None => debug!("Paper cancel for inactive order {} ignored", order),
        }
    }

    fn on_market_price(&mut self, price: Decimal) {
        self.last_price = Some(price);
        let fillable: Vec<OrderRef> = self
            .orders
            .iter()
            .filter(|(_, order)| order.should_fill(price, self.config.fill_on_touch))
            .map(|(order_ref, _)| *order_ref)
            .collect();
        for order_ref in fillable {
            self.execute(order_ref, price);
        }
    }
}
