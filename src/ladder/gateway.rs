//! Order gateway abstraction - enables mocking for tests
//!
//! Gateway calls are fire-and-forget: a returned [`OrderRef`] only means the
//! request was handed over. Acceptance, fills and cancellations come back
//! later as [`GatewayEvent`](super::types::GatewayEvent)s.

use rust_decimal::Decimal;

use super::types::{OrderRef, OrderSide};

/// Order placement and cancellation
pub trait OrderGateway {
    /// Place a limit order
    fn place_limit(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef;

    /// Place a stop order triggering at `price`
    fn place_stop(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef;

    /// Place a take-profit order at `price`
    fn place_take_profit(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef;

    /// Request cancellation; the outcome arrives as an order-state event
    fn cancel(&mut self, order: OrderRef);

    /// Venues that match orders locally (paper trading) hook the last traded
    /// price here. Live gateways ignore it.
    fn on_market_price(&mut self, _price: Decimal) {}
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

/// Mock gateway for testing slots without any venue.
pub mod mock {
    use super::*;
    use crate::ladder::types::OrderKind;

    /// A request recorded by the mock gateway
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct PlacedOrder {
        pub order_ref: OrderRef,
        pub kind: OrderKind,
        pub side: OrderSide,
        pub price: Decimal,
        pub volume: Decimal,
    }

    /// Mock gateway recording every request, handing out sequential refs
    #[derive(Debug, Default)]
    pub struct MockGateway {
        pub placed: Vec<PlacedOrder>,
        pub cancelled: Vec<OrderRef>,
        pub market_prices: Vec<Decimal>,
        next_ref: u64,
    }

    impl MockGateway {
        pub fn new() -> Self {
            Self::default()
        }

        /// Most recently placed order of the given kind
        pub fn last_of(&self, kind: OrderKind) -> Option<&PlacedOrder> {
            self.placed.iter().rev().find(|o| o.kind == kind)
        }

        /// Lookup by handle
        pub fn find(&self, order_ref: OrderRef) -> Option<&PlacedOrder> {
            self.placed.iter().find(|o| o.order_ref == order_ref)
        }

        pub fn count_of(&self, kind: OrderKind) -> usize {
            self.placed.iter().filter(|o| o.kind == kind).count()
        }

        pub fn was_cancelled(&self, order_ref: OrderRef) -> bool {
            self.cancelled.contains(&order_ref)
        }

        fn record(&mut self, kind: OrderKind, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
            self.next_ref += 1;
            let order_ref = OrderRef(self.next_ref);
            self.placed.push(PlacedOrder {
                order_ref,
                kind,
                side,
                price,
                volume,
            });
            order_ref
        }
    }

    impl OrderGateway for MockGateway {
        fn place_limit(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
            self.record(OrderKind::Limit, side, price, volume)
        }

        fn place_stop(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
            self.record(OrderKind::Stop, side, price, volume)
        }

        fn place_take_profit(&mut self, side: OrderSide, price: Decimal, volume: Decimal) -> OrderRef {
            self.record(OrderKind::TakeProfit, side, price, volume)
        }

        fn cancel(&mut self, order: OrderRef) {
            self.cancelled.push(order);
        }

        fn on_market_price(&mut self, price: Decimal) {
            self.market_prices.push(price);
        }
    }
}
