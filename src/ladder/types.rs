//! Core data types for the slot ladder

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::{LadderError, LadderResult};

/// Direction of a ladder slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// Order side used to open exposure on this slot
    pub fn entry_side(&self) -> OrderSide {
        match self {
            Side::Long => OrderSide::Buy,
            Side::Short => OrderSide::Sell,
        }
    }

    /// Order side used by the protective orders
    pub fn exit_side(&self) -> OrderSide {
        self.entry_side().opposite()
    }

    /// Whether `candidate` is a tighter stop than `current` for this side
    pub fn is_tighter(&self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            Side::Long => candidate > current,
            Side::Short => candidate < current,
        }
    }

    /// Distance by which `candidate` improves on `current` (negative if it loosens)
    pub fn improvement(&self, candidate: Decimal, current: Decimal) -> Decimal {
        match self {
            Side::Long => candidate - current,
            Side::Short => current - candidate,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Order side as seen by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

/// Lifecycle state of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// No orders, ready to be armed
    Idle,
    /// Entry order sent, nothing filled yet
    PendingEntry,
    /// Entry order has received at least one fill but still has a balance
    PartiallyFilled,
    /// Entry complete, stop and take-profit working
    Open,
    /// Protective orders are being torn down
    Closing,
}

impl SlotState {
    /// Check if the slot is waiting on its entry order
    pub fn is_pending(&self) -> bool {
        matches!(self, SlotState::PendingEntry | SlotState::PartiallyFilled)
    }

    /// Check if the slot holds any order
    pub fn is_busy(&self) -> bool {
        !matches!(self, SlotState::Idle)
    }
}

/// Gateway order handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderRef(pub u64);

impl fmt::Display for OrderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Gateway trade identifier, unique per execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeId(pub u64);

/// Kind of order a slot can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit,
    Stop,
    TakeProfit,
}

/// Which protective leg an event refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtectiveKind {
    Stop,
    TakeProfit,
}

/// Periodic level push from the level provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUpdate {
    pub lower_bound: Decimal,
    pub mid_level: Decimal,
    pub upper_bound: Decimal,
}

impl LevelUpdate {
    pub fn new(lower_bound: Decimal, mid_level: Decimal, upper_bound: Decimal) -> Self {
        Self {
            lower_bound,
            mid_level,
            upper_bound,
        }
    }

    /// Bands must be ordered lower <= mid <= upper
    pub fn is_ordered(&self) -> bool {
        self.lower_bound <= self.mid_level && self.mid_level <= self.upper_bound
    }
}

/// Execution report for an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub order_ref: OrderRef,
    pub trade_id: TradeId,
    pub volume: Decimal,
    pub price: Decimal,
}

/// Gateway-side order state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderState {
    /// Accepted and working
    Active,
    /// Fully executed
    Done,
    Cancelled,
    Rejected,
}

impl OrderState {
    /// Terminal states end the order's life on the gateway
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderState::Active)
    }
}

/// Order state change report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStateEvent {
    pub order_ref: OrderRef,
    pub state: OrderState,
    /// Unfilled balance reported by the gateway
    pub remaining_balance: Decimal,
}

/// Any asynchronous callback coming from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayEvent {
    Trade(TradeEvent),
    OrderState(OrderStateEvent),
}

impl GatewayEvent {
    /// Order handle this event refers to
    pub fn order_ref(&self) -> OrderRef {
        match self {
            GatewayEvent::Trade(t) => t.order_ref,
            GatewayEvent::OrderState(s) => s.order_ref,
        }
    }
}

/// Validated entry/stop/take triple for one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PriceLevels {
    side: Side,
    entry: Decimal,
    stop: Decimal,
    take: Decimal,
}

impl PriceLevels {
    /// Build price levels, checking they are positive and ordered for `side`
    ///
    /// Long: stop < entry < take. Short: take < entry < stop.
    pub fn new(side: Side, entry: Decimal, stop: Decimal, take: Decimal) -> LadderResult<Self> {
        if entry <= Decimal::ZERO || stop <= Decimal::ZERO || take <= Decimal::ZERO {
            return Err(LadderError::InvalidLevels(format!(
                "prices must be positive: entry={}, stop={}, take={}",
                entry, stop, take
            )));
        }

        let ordered = match side {
            Side::Long => stop < entry && entry < take,
            Side::Short => take < entry && entry < stop,
        };
        if !ordered {
            return Err(LadderError::InvalidLevels(format!(
                "{} levels out of order: entry={}, stop={}, take={}",
                side, entry, stop, take
            )));
        }

        Ok(Self {
            side,
            entry,
            stop,
            take,
        })
    }

    /// Side these levels were validated for
    pub fn side(&self) -> Side {
        self.side
    }

    pub fn entry(&self) -> Decimal {
        self.entry
    }

    pub fn stop(&self) -> Decimal {
        self.stop
    }

    pub fn take(&self) -> Decimal {
        self.take
    }
}

/// Position of a slot inside the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId {
    pub side: Side,
    pub index: usize,
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.side, self.index)
    }
}

/// Read-only view of a slot for monitoring
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub side: Side,
    pub index: usize,
    pub state: SlotState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_price: Option<Decimal>,
    pub requested_volume: Decimal,
    pub filled_volume: Decimal,
}

/// Notable slot transitions, reported for telemetry
///
/// None of these are errors for the pool: each one is the end of a well
/// defined transition or a deliberately ignored event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotOutcome {
    /// Entry completed and protective orders were placed
    EntryFilled { volume: Decimal },
    /// Entry rejected before any fill
    RejectedEntry,
    /// Entry cancelled with nothing filled
    CancelledBeforeFill,
    /// Entry cancelled after a partial fill, protected with the filled amount
    CancelledAfterPartialFill { filled: Decimal },
    /// Trade id already applied
    DuplicateEventIgnored { trade_id: TradeId },
    /// Session cutoff reached while the entry was still working
    StaleOrderExpired,
    /// Stop or take-profit executed, sibling cancelled
    ProtectiveOrderExecuted { kind: ProtectiveKind, volume: Decimal },
    /// A protective order died without executing; the leg is re-placed or the
    /// slot closes on the surviving leg, keeping the filled volume
    ProtectionLost { kind: ProtectiveKind, volume: Decimal },
    /// Manual release finished, protective orders withdrawn
    ProtectionWithdrawn { volume: Decimal },
}
