//! Slot Ladder Module
//!
//! This module manages a small pool of independent entry slots. Each slot
//! places a limit entry, absorbs partial or full fills, protects exactly the
//! filled volume with a stop and a take-profit, trails the stop as the level
//! band advances and is torn down at the session cutoff or on release.
//!
//! # Architecture
//!
//! The ladder module is organized into several sub-modules:
//!
//! - [`config`] - Ladder and session configuration and validation
//! - [`types`] - Core data types (Side, SlotState, PriceLevels, events)
//! - [`errors`] - Ladder-specific error types
//! - [`gateway`] - Order gateway abstraction (mockable for testing)
//! - [`slot`] - Single slot lifecycle
//! - [`pool`] - Slot pool with handle routing and outcome journal
//! - [`trailing`] - Trailing stop controller
//! - [`session`] - Session window, cutoff and clocks
//! - [`arming`] - Band ladder arming policy
//! - [`engine`] - Engine wiring everything behind [`LadderListener`]
//! - [`paper`] - Local matching gateway for dry runs
//! - [`feed`] - Market feeds and JSON-lines replay
//! - [`snapshot`] - Monitoring snapshot with JSON persistence
//! - [`ring`] - Fixed-capacity ring buffer
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use rust_decimal_macros::dec;
//! use slot_ladder::ladder::{
//!     LadderConfig, LadderEngine, LadderListener, LevelUpdate, PaperConfig, PaperGateway,
//!     SessionConfig,
//! };
//!
//! // 1 lot, 50 pip stop, 100 pip target
//! let config = LadderConfig::new(dec!(1), dec!(50), dec!(100)).with_slots_per_side(3);
//! let (gateway, mut events) = PaperGateway::channel(PaperConfig::default());
//! let mut engine = LadderEngine::new(&config, &SessionConfig::default(), gateway)?;
//!
//! engine.on_started();
//! engine.on_level_update(&LevelUpdate::new(dec!(1.1990), dec!(1.2000), dec!(1.2010)));
//! engine.on_market_price(dec!(1.1989));
//! while let Ok(event) = events.try_recv() {
//!     engine.dispatch(&event);
//! }
//! ```
//!
//! # Testing
//!
//! The module provides a mock gateway that records every request:
//!
//! ```rust,ignore
//! use slot_ladder::ladder::gateway::mock::MockGateway;
//!
//! let mut gateway = MockGateway::new();
//! // Drive slots or the pool, then inspect gateway.placed / gateway.cancelled
//! ```

pub mod arming;
pub mod config;
pub mod engine;
pub mod errors;
pub mod feed;
pub mod gateway;
pub mod listener;
pub mod paper;
pub mod pool;
pub mod ring;
pub mod session;
pub mod slot;
pub mod snapshot;
pub mod trailing;
pub mod types;

// Re-export commonly used types
pub use arming::BandArming;
pub use config::{LadderConfig, SessionConfig, TrailReference};
pub use engine::LadderEngine;
pub use errors::{LadderError, LadderResult};
pub use feed::{FeedItem, MarketFeed, ReplayFeed};
pub use gateway::OrderGateway;
pub use listener::{LadderListener, NoOpListener};
pub use paper::{PaperConfig, PaperGateway, PaperPosition};
pub use pool::{JournalEntry, PoolSummary, SideSummary, SlotPool};
pub use ring::RingBuffer;
pub use session::{Clock, ManualClock, SessionScheduler, SystemClock};
pub use slot::Slot;
pub use snapshot::LadderSnapshot;
pub use trailing::TrailingController;
pub use types::{
    GatewayEvent, LevelUpdate, OrderKind, OrderRef, OrderSide, OrderState, OrderStateEvent,
    PriceLevels, ProtectiveKind, Side, SlotId, SlotOutcome, SlotState, SlotStatus, TradeEvent,
    TradeId,
};
