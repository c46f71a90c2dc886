//! Trailing stop controller
//!
//! Computes one stop candidate per side from the latest level update and
//! offers it to every open slot of that side. Whether a slot accepts is up
//! to the slot's own monotonic rule.

use log::{debug, warn};
use rust_decimal::{Decimal, RoundingStrategy};

use super::config::{LadderConfig, TrailReference};
use super::gateway::OrderGateway;
use super::pool::SlotPool;
use super::ring::RingBuffer;
use super::types::{LevelUpdate, Side};

#[derive(Debug, Clone)]
pub struct TrailingController {
    reference: TrailReference,
    offset: Decimal,
    scale: u32,
    history: RingBuffer<LevelUpdate>,
}

impl TrailingController {
    pub fn new(config: &LadderConfig) -> Self {
        Self {
            reference: config.trail_reference,
            offset: config.pips(config.trail_offset_pips),
            scale: config.price_scale(),
            history: RingBuffer::with_capacity(config.level_history),
        }
    }

    pub fn reference(&self) -> TrailReference {
        self.reference
    }

    /// Latest level update seen
    pub fn latest(&self) -> Option<&LevelUpdate> {
        self.history.latest()
    }

    /// Recent level updates, oldest first
    pub fn history(&self) -> impl Iterator<Item = &LevelUpdate> {
        self.history.iter()
    }

    /// Stop candidates `(long, short)` for a level update
    ///
    /// Long candidates round down and short candidates round up to the pip,
    /// so rounding never pulls a stop closer than the reference line.
    pub fn candidates(&self, update: &LevelUpdate) -> (Option<Decimal>, Option<Decimal>) {
        let (long, short) = match self.reference {
            TrailReference::Off => return (None, None),
            TrailReference::Band => (update.lower_bound - self.offset, update.upper_bound + self.offset),
            TrailReference::Mid => (update.mid_level - self.offset, update.mid_level + self.offset),
        };

        let long = long.round_dp_with_strategy(self.scale, RoundingStrategy::ToNegativeInfinity);
        let short = short.round_dp_with_strategy(self.scale, RoundingStrategy::ToPositiveInfinity);
        (
            (long > Decimal::ZERO).then_some(long),
            (short > Decimal::ZERO).then_some(short),
        )
    }

    /// Record the update and trail both sides; returns how many stops moved
    pub fn apply<G: OrderGateway + ?Sized>(
        &mut self,
        gateway: &mut G,
        pool: &mut SlotPool,
        update: &LevelUpdate,
    ) -> usize {
        if !update.is_ordered() {
            warn!("Ignoring unordered level update {:?}", update);
            return 0;
        }
        self.history.push(*update);

        let (long, short) = self.candidates(update);
        let mut moved = 0;
        if let Some(candidate) = long {
            moved += pool.trail(gateway, Side::Long, candidate);
        }
        if let Some(candidate) = short {
            moved += pool.trail(gateway, Side::Short, candidate);
        }
        if moved > 0 {
            debug!("Trailed {} stops (long {:?}, short {:?})", moved, long, short);
        }
        moved
    }
}
