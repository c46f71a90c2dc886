use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, error, info};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::interval;

use crate::config::Settings;
use crate::ladder::errors::LadderResult;
use crate::ladder::feed::{FeedItem, MarketFeed, ReplayFeed};
use crate::ladder::gateway::OrderGateway;
use crate::ladder::listener::LadderListener;
use crate::ladder::paper::PaperGateway;
use crate::ladder::snapshot::LadderSnapshot;
use crate::ladder::types::GatewayEvent;
use crate::ladder::LadderEngine;

/// Extra release rounds after stopping
const MAX_RELEASE_PASSES: usize = 3;

/// Event loop timing and persistence
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub tick_interval: Duration,
    pub snapshot_interval: Duration,
    pub snapshot_path: Option<PathBuf>,
    /// Give up after this many snapshot failures in a row
    pub max_consecutive_errors: u32,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            snapshot_interval: Duration::from_secs(30),
            snapshot_path: None,
            max_consecutive_errors: 5,
        }
    }
}

impl RunnerOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            tick_interval: Duration::from_secs(settings.session.tick_interval_secs.max(1)),
            snapshot_interval: Duration::from_secs(settings.snapshot.interval_secs.max(1)),
            snapshot_path: settings.snapshot.path.clone(),
            ..Self::default()
        }
    }
}

/// Runner for a paper-traded ladder fed by a replay
pub struct LadderRunner {
    config: Settings,
}

impl LadderRunner {
    /// Create a new runner from a configuration file
    pub fn new(config_path: impl AsRef<Path>) -> LadderResult<Self> {
        let path = config_path.as_ref().to_string_lossy();
        let config = Settings::load(&path)?;
        Ok(Self { config })
    }

    pub fn from_settings(config: Settings) -> LadderResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Run until the feed is exhausted or Ctrl-C
    pub async fn run(self) -> LadderResult<LadderSnapshot> {
        // 1. Setup Logging
        if std::env::var("RUST_LOG").is_err() {
            std::env::set_var("RUST_LOG", &self.config.log.level);
        }
        env_logger::try_init().ok();

        info!("Starting LadderRunner...");

        // 2. Paper venue and engine
        let (gateway, mut events) = PaperGateway::channel(self.config.paper.clone());
        let mut engine = LadderEngine::new(&self.config.ladder, &self.config.session, gateway)?;

        // 3. Feed
        let mut feed = ReplayFeed::from_file(
            &self.config.feed.path,
            Duration::from_millis(self.config.feed.replay_delay_ms),
        );
        info!("Replaying {}", self.config.feed.path.display());

        let options = RunnerOptions::from_settings(&self.config);
        let snapshot = drive(&mut engine, &mut feed, &mut events, &options).await?;

        let position = engine.gateway().position();
        info!(
            "Paper position {} @ {}, realized {}",
            position.size, position.entry_price, position.realized_pnl
        );
        Ok(snapshot)
    }
}

/// Pump feed items, gateway events and timers into the engine
///
/// Gateway events are always drained before the next feed item so the
/// engine reacts to a fill before it sees the following price. Returns the
/// final snapshot after every slot has been released.
pub async fn drive<G, F>(
    engine: &mut LadderEngine<G>,
    feed: &mut F,
    events: &mut UnboundedReceiver<GatewayEvent>,
    options: &RunnerOptions,
) -> LadderResult<LadderSnapshot>
where
    G: OrderGateway,
    F: MarketFeed,
{
    let mut feed_rx = feed.subscribe().await?;
    let mut tick_timer = interval(options.tick_interval);
    let mut snapshot_timer = interval(options.snapshot_interval);
    let mut consecutive_errors = 0u32;

    engine.on_started();

    loop {
        tokio::select! {
            biased;

            Some(event) = events.recv() => dispatch(engine, &event),
            item = feed_rx.recv() => match item {
                Some(FeedItem::Levels(update)) => engine.on_level_update(&update),
                Some(FeedItem::Price { price }) => engine.on_market_price(price),
                None => {
                    info!("Feed exhausted");
                    break;
                }
            },
            _ = tick_timer.tick() => engine.on_tick(),
            _ = snapshot_timer.tick() => {
                match save_snapshot(engine, options) {
                    Ok(_) => consecutive_errors = 0,
                    Err(e) => {
                        error!("Error saving snapshot: {}", e);
                        consecutive_errors += 1;
                        if consecutive_errors >= options.max_consecutive_errors {
                            error!("Too many consecutive errors, stopping");
                            break;
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    drain(engine, events);
    engine.on_stopped();
    drain(engine, events);
    // Entries cancelled after a partial fill come back Open with fresh protection
    for _ in 0..MAX_RELEASE_PASSES {
        if engine.release_all() == 0 {
            break;
        }
        drain(engine, events);
    }
    feed.unsubscribe().await?;

    if let Err(e) = save_snapshot(engine, options) {
        error!("Error saving final snapshot: {}", e);
    }
    Ok(engine.snapshot())
}

fn dispatch<L: LadderListener>(listener: &mut L, event: &GatewayEvent) {
    match event {
        GatewayEvent::Trade(trade) => listener.on_trade(trade),
        GatewayEvent::OrderState(state) => listener.on_order_state(state),
    }
}

/// Handle every event already queued, including the ones handling produces
fn drain<G: OrderGateway>(engine: &mut LadderEngine<G>, events: &mut UnboundedReceiver<GatewayEvent>) {
    let mut handled = 0usize;
    while let Ok(event) = events.try_recv() {
        dispatch(engine, &event);
        handled += 1;
    }
    if handled > 0 {
        debug!("Drained {} gateway events", handled);
    }
}

fn save_snapshot<G: OrderGateway>(engine: &LadderEngine<G>, options: &RunnerOptions) -> LadderResult<()> {
    match &options.snapshot_path {
        Some(path) => engine.snapshot().save_to_file_atomic(path),
        None => Ok(()),
    }
}
