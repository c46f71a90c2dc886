//! Ladder engine - wires the pool, trailing, session and arming together
//!
//! All mutation is synchronous. The engine never awaits: the runner feeds it
//! one event at a time through [`LadderListener`].

use chrono::Utc;
use log::{info, warn};
use rust_decimal::Decimal;

use super::arming::BandArming;
use super::config::{LadderConfig, SessionConfig};
use super::errors::LadderResult;
use super::gateway::OrderGateway;
use super::listener::LadderListener;
use super::pool::SlotPool;
use super::session::{Clock, SessionScheduler, SystemClock};
use super::snapshot::LadderSnapshot;
use super::trailing::TrailingController;
use super::types::{GatewayEvent, LevelUpdate, OrderStateEvent, SlotOutcome, TradeEvent};

pub struct LadderEngine<G: OrderGateway> {
    gateway: G,
    pool: SlotPool,
    trailing: TrailingController,
    session: SessionScheduler,
    arming: BandArming,
    clock: Box<dyn Clock + Send>,
    running: bool,
}

impl<G: OrderGateway> LadderEngine<G> {
    /// Create an engine on the wall clock
    pub fn new(config: &LadderConfig, session: &SessionConfig, gateway: G) -> LadderResult<Self> {
        Self::with_clock(config, session, gateway, Box::new(SystemClock))
    }

    pub fn with_clock(
        config: &LadderConfig,
        session: &SessionConfig,
        gateway: G,
        clock: Box<dyn Clock + Send>,
    ) -> LadderResult<Self> {
        config.validate()?;
        session.validate()?;

        Ok(Self {
            gateway,
            pool: SlotPool::new(config.slots_per_side, config.min_trail_step(), config.journal_capacity),
            trailing: TrailingController::new(config),
            session: SessionScheduler::new(session),
            arming: BandArming::new(config),
            clock,
            running: false,
        })
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    pub fn trailing(&self) -> &TrailingController {
        &self.trailing
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_session_open(&self) -> bool {
        self.session.is_open(self.clock.now())
    }

    /// Route one gateway event to its slot
    pub fn dispatch(&mut self, event: &GatewayEvent) -> Option<SlotOutcome> {
        self.pool.route(&mut self.gateway, event)
    }

    /// Cancel everything the ladder holds
    pub fn release_all(&mut self) -> usize {
        self.pool.release_all(&mut self.gateway)
    }

    pub fn snapshot(&self) -> LadderSnapshot {
        LadderSnapshot {
            taken_at: Utc::now(),
            session_open: self.is_session_open(),
            summary: self.pool.summary(),
            slots: self.pool.statuses(),
            latest_levels: self.trailing.latest().copied(),
            recent_outcomes: self.pool.recent_outcomes().copied().collect(),
        }
    }
}

impl<G: OrderGateway> LadderListener for LadderEngine<G> {
    fn on_started(&mut self) {
        self.running = true;
        info!("Ladder engine started");
        self.on_tick();
    }

    fn on_level_update(&mut self, update: &LevelUpdate) {
        if !update.is_ordered() {
            warn!("Ignoring unordered level update {:?}", update);
            return;
        }

        // Tighten existing stops before arming new entries
        self.trailing.apply(&mut self.gateway, &mut self.pool, update);

        if self.running && self.session.is_open(self.clock.now()) {
            self.arming.apply(&mut self.gateway, &mut self.pool, update);
        }
    }

    fn on_market_price(&mut self, price: Decimal) {
        self.gateway.on_market_price(price);
    }

    fn on_trade(&mut self, trade: &TradeEvent) {
        self.pool.route_trade(&mut self.gateway, trade);
    }

    fn on_order_state(&mut self, event: &OrderStateEvent) {
        self.pool.route_order_state(&mut self.gateway, event);
    }

    fn on_tick(&mut self) {
        let now = self.clock.now();
        self.session.tick(&mut self.gateway, &mut self.pool, now);
    }

    fn on_stopped(&mut self) {
        self.running = false;
        let released = self.release_all();
        info!("Ladder engine stopped, {} slots released", released);
    }
}
