//! Band ladder arming policy
//!
//! Places entries outside the band: longs below `lower_bound`, shorts above
//! `upper_bound`. Each busy slot on a side pushes the next entry one ladder
//! step further away, so consecutive slots stagger instead of stacking.

use log::debug;
use rust_decimal::{Decimal, RoundingStrategy};

use super::config::LadderConfig;
use super::gateway::OrderGateway;
use super::pool::SlotPool;
use super::types::{LevelUpdate, PriceLevels, Side};

#[derive(Debug, Clone)]
pub struct BandArming {
    enable_long: bool,
    enable_short: bool,
    volume: Decimal,
    entry_offset: Decimal,
    ladder_step: Decimal,
    stop_loss: Decimal,
    take_profit: Decimal,
    scale: u32,
}

impl BandArming {
    pub fn new(config: &LadderConfig) -> Self {
        Self {
            enable_long: config.enable_long,
            enable_short: config.enable_short,
            volume: config.volume,
            entry_offset: config.pips(config.entry_offset_pips),
            ladder_step: config.pips(config.ladder_step_pips),
            stop_loss: config.pips(config.stop_loss_pips),
            take_profit: config.pips(config.take_profit_pips),
            scale: config.price_scale(),
        }
    }

    pub fn is_enabled(&self, side: Side) -> bool {
        match side {
            Side::Long => self.enable_long,
            Side::Short => self.enable_short,
        }
    }

    /// Levels for the next entry on `side` given `busy` slots already in use
    pub fn levels_for(&self, side: Side, update: &LevelUpdate, busy: usize) -> Option<PriceLevels> {
        let stagger = self.entry_offset + self.ladder_step * Decimal::from(busy);
        let result = match side {
            Side::Long => {
                let entry = (update.lower_bound - stagger)
                    .round_dp_with_strategy(self.scale, RoundingStrategy::ToNegativeInfinity);
                PriceLevels::new(side, entry, entry - self.stop_loss, entry + self.take_profit)
            }
            Side::Short => {
                let entry = (update.upper_bound + stagger)
                    .round_dp_with_strategy(self.scale, RoundingStrategy::ToPositiveInfinity);
                PriceLevels::new(side, entry, entry + self.stop_loss, entry - self.take_profit)
            }
        };

        match result {
            Ok(levels) => Some(levels),
            Err(e) => {
                debug!("Skipping {} arm: {}", side, e);
                None
            }
        }
    }

    /// Arm at most one slot per enabled side; returns how many were armed
    pub fn apply<G: OrderGateway + ?Sized>(
        &self,
        gateway: &mut G,
        pool: &mut SlotPool,
        update: &LevelUpdate,
    ) -> usize {
        let mut armed = 0;
        for side in [Side::Long, Side::Short] {
            if !self.is_enabled(side) || pool.idle_count(side) == 0 {
                continue;
            }
            let Some(levels) = self.levels_for(side, update, pool.busy_count(side)) else {
                continue;
            };
            if pool.arm(gateway, side, self.volume, &levels) {
                armed += 1;
            }
        }
        armed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::gateway::mock::MockGateway;
    use crate::ladder::types::{OrderKind, OrderSide};
    use rust_decimal_macros::dec;

    fn arming() -> BandArming {
        let config = LadderConfig::new(dec!(1), dec!(50), dec!(100)).with_entry_spacing(dec!(5), dec!(10));
        BandArming::new(&config)
    }

    fn band() -> LevelUpdate {
        LevelUpdate::new(dec!(1.2000), dec!(1.2050), dec!(1.2100))
    }

    #[test]
    fn test_long_levels_below_band() {
        let levels = arming().levels_for(Side::Long, &band(), 0).unwrap();
        assert_eq!(levels.entry(), dec!(1.1995));
        assert_eq!(levels.stop(), dec!(1.1945));
        assert_eq!(levels.take(), dec!(1.2095));
    }

    #[test]
    fn test_short_levels_above_band_with_stagger() {
        let levels = arming().levels_for(Side::Short, &band(), 2).unwrap();
        assert_eq!(levels.entry(), dec!(1.2125));
        assert_eq!(levels.stop(), dec!(1.2175));
        assert_eq!(levels.take(), dec!(1.2025));
    }

    #[test]
    fn test_invalid_levels_are_skipped() {
        // Take-profit distance larger than the price itself
        let config = LadderConfig::new(dec!(1), dec!(50), dec!(20000));
        let arming = BandArming::new(&config);
        assert!(arming.levels_for(Side::Short, &band(), 0).is_none());
    }

    #[test]
    fn test_apply_arms_one_per_side() {
        let mut gateway = MockGateway::new();
        let mut pool = SlotPool::new(2, dec!(0.0005), 8);
        let arming = arming();

        assert_eq!(arming.apply(&mut gateway, &mut pool, &band()), 2);
        assert_eq!(arming.apply(&mut gateway, &mut pool, &band()), 2);
        assert_eq!(arming.apply(&mut gateway, &mut pool, &band()), 0);

        let buys: Vec<Decimal> = gateway
            .placed
            .iter()
            .filter(|o| o.kind == OrderKind::Limit && o.side == OrderSide::Buy)
            .map(|o| o.price)
            .collect();
        assert_eq!(buys, vec![dec!(1.1995), dec!(1.1985)]);
    }

    #[test]
    fn test_disabled_side_never_arms() {
        let mut gateway = MockGateway::new();
        let mut pool = SlotPool::new(2, dec!(0.0005), 8);
        let config = LadderConfig::new(dec!(1), dec!(50), dec!(100)).with_sides(true, false);

        assert_eq!(BandArming::new(&config).apply(&mut gateway, &mut pool, &band()), 1);
        assert_eq!(pool.busy_count(Side::Short), 0);
    }
}
