//! Ladder and session configuration

use chrono::NaiveTime;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::errors::{LadderError, LadderResult};

/// Reference line the trailing stop follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrailReference {
    /// Long stops follow the lower band, short stops the upper band
    Band,
    /// Both sides follow the mid level
    Mid,
    /// Stops stay where they were placed
    Off,
}

impl Default for TrailReference {
    fn default() -> Self {
        Self::Band
    }
}

/// Slot ladder configuration
///
/// Distances are expressed in pips and converted with `pip_size`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderConfig {
    /// Number of slots on each side
    #[serde(default = "default_slots_per_side")]
    pub slots_per_side: usize,

    /// Price value of one pip (e.g. 0.0001 for EURUSD)
    #[serde(default = "default_pip_size")]
    pub pip_size: Decimal,

    /// Volume requested by every entry
    pub volume: Decimal,

    /// Distance of the first entry beyond the band
    #[serde(default)]
    pub entry_offset_pips: Decimal,

    /// Extra distance for every busy slot on the same side
    #[serde(default = "default_ladder_step")]
    pub ladder_step_pips: Decimal,

    /// Stop distance from the entry
    pub stop_loss_pips: Decimal,

    /// Take-profit distance from the entry
    pub take_profit_pips: Decimal,

    /// Smallest stop improvement that triggers a replace
    #[serde(default = "default_min_trail_step")]
    pub min_trail_step_pips: Decimal,

    #[serde(default)]
    pub trail_reference: TrailReference,

    /// Distance kept between the reference line and the trailed stop
    #[serde(default)]
    pub trail_offset_pips: Decimal,

    #[serde(default = "default_true")]
    pub enable_long: bool,

    #[serde(default = "default_true")]
    pub enable_short: bool,

    /// Number of recent slot outcomes kept for monitoring
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,

    /// Number of recent level updates kept by the trailing controller
    #[serde(default = "default_level_history")]
    pub level_history: usize,
}

fn default_slots_per_side() -> usize {
    3
}

fn default_pip_size() -> Decimal {
    dec!(0.0001)
}

fn default_ladder_step() -> Decimal {
    dec!(10)
}

fn default_min_trail_step() -> Decimal {
    dec!(5)
}

fn default_true() -> bool {
    true
}

fn default_journal_capacity() -> usize {
    64
}

fn default_level_history() -> usize {
    32
}

impl LadderConfig {
    /// Create a configuration with the required trade parameters
    ///
    /// # Arguments
    /// * `volume` - Volume of every entry order
    /// * `stop_loss_pips` - Stop distance from the entry, in pips
    /// * `take_profit_pips` - Take-profit distance from the entry, in pips
    pub fn new(volume: Decimal, stop_loss_pips: Decimal, take_profit_pips: Decimal) -> Self {
        Self {
            slots_per_side: default_slots_per_side(),
            pip_size: default_pip_size(),
            volume,
            entry_offset_pips: Decimal::ZERO,
            ladder_step_pips: default_ladder_step(),
            stop_loss_pips,
            take_profit_pips,
            min_trail_step_pips: default_min_trail_step(),
            trail_reference: TrailReference::default(),
            trail_offset_pips: Decimal::ZERO,
            enable_long: true,
            enable_short: true,
            journal_capacity: default_journal_capacity(),
            level_history: default_level_history(),
        }
    }

    /// Builder: set slots per side
    pub fn with_slots_per_side(mut self, slots: usize) -> Self {
        self.slots_per_side = slots;
        self
    }

    /// Builder: set pip size
    pub fn with_pip_size(mut self, pip_size: Decimal) -> Self {
        self.pip_size = pip_size;
        self
    }

    /// Builder: set entry offset and ladder step
    pub fn with_entry_spacing(mut self, entry_offset_pips: Decimal, ladder_step_pips: Decimal) -> Self {
        self.entry_offset_pips = entry_offset_pips;
        self.ladder_step_pips = ladder_step_pips;
        self
    }

    /// Builder: set trailing behaviour
    pub fn with_trailing(
        mut self,
        reference: TrailReference,
        offset_pips: Decimal,
        min_step_pips: Decimal,
    ) -> Self {
        self.trail_reference = reference;
        self.trail_offset_pips = offset_pips;
        self.min_trail_step_pips = min_step_pips;
        self
    }

    /// Builder: enable or disable each side
    pub fn with_sides(mut self, enable_long: bool, enable_short: bool) -> Self {
        self.enable_long = enable_long;
        self.enable_short = enable_short;
        self
    }

    /// Builder: set outcome journal capacity
    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }

    /// Convert a pip distance to a price distance
    pub fn pips(&self, pips: Decimal) -> Decimal {
        pips * self.pip_size
    }

    /// Minimum trailing improvement as a price distance
    pub fn min_trail_step(&self) -> Decimal {
        self.pips(self.min_trail_step_pips)
    }

    /// Number of decimal places of the pip size, used to round prices
    pub fn price_scale(&self) -> u32 {
        self.pip_size.normalize().scale()
    }

    /// Validate the configuration
    pub fn validate(&self) -> LadderResult<()> {
        if self.slots_per_side == 0 {
            return Err(LadderError::InvalidConfig(
                "slots_per_side must be at least 1".into(),
            ));
        }

        if self.pip_size <= Decimal::ZERO {
            return Err(LadderError::InvalidConfig("pip_size must be positive".into()));
        }

        if self.volume <= Decimal::ZERO {
            return Err(LadderError::InvalidConfig("volume must be positive".into()));
        }

        if self.stop_loss_pips <= Decimal::ZERO || self.take_profit_pips <= Decimal::ZERO {
            return Err(LadderError::InvalidConfig(
                "stop_loss_pips and take_profit_pips must be positive".into(),
            ));
        }

        let distances = [
            ("entry_offset_pips", self.entry_offset_pips),
            ("ladder_step_pips", self.ladder_step_pips),
            ("min_trail_step_pips", self.min_trail_step_pips),
            ("trail_offset_pips", self.trail_offset_pips),
        ];
        for (name, value) in distances {
            if value < Decimal::ZERO {
                return Err(LadderError::InvalidConfig(format!(
                    "{} cannot be negative",
                    name
                )));
            }
        }

        if !self.enable_long && !self.enable_short {
            return Err(LadderError::InvalidConfig(
                "at least one side must be enabled".into(),
            ));
        }

        if self.journal_capacity == 0 || self.level_history == 0 {
            return Err(LadderError::InvalidConfig(
                "journal_capacity and level_history must be at least 1".into(),
            ));
        }

        Ok(())
    }

    /// Load config from JSON file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> LadderResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to JSON file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> LadderResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Trading session window, in UTC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// No arming before this time of day
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<NaiveTime>,

    /// Pending entries are cancelled from this time of day on
    #[serde(default = "default_cutoff")]
    pub cutoff: NaiveTime,

    /// How often the runner checks the cutoff
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
}

fn default_cutoff() -> NaiveTime {
    NaiveTime::from_hms_opt(21, 0, 0).unwrap_or(NaiveTime::MIN)
}

fn default_tick_interval() -> u64 {
    1
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            start: None,
            cutoff: default_cutoff(),
            tick_interval_secs: default_tick_interval(),
        }
    }
}

impl SessionConfig {
    /// Builder: set the session window
    pub fn with_window(mut self, start: Option<NaiveTime>, cutoff: NaiveTime) -> Self {
        self.start = start;
        self.cutoff = cutoff;
        self
    }

    pub fn validate(&self) -> LadderResult<()> {
        if let Some(start) = self.start {
            if start >= self.cutoff {
                return Err(LadderError::InvalidConfig(
                    "session start must be before cutoff".into(),
                ));
            }
        }

        if self.tick_interval_secs == 0 {
            return Err(LadderError::InvalidConfig(
                "tick_interval_secs must be at least 1".into(),
            ));
        }

        Ok(())
    }
}
