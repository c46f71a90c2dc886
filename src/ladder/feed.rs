//! Market feeds: level pushes and last-traded prices
//!
//! A feed hands the runner a channel of [`FeedItem`]s. [`ReplayFeed`] replays
//! a JSON-lines recording, one item per line:
//!
//! ```text
//! {"type":"levels","lower_bound":"1.1990","mid_level":"1.2000","upper_bound":"1.2010"}
//! {"type":"price","price":"1.1995"}
//! ```

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;

use super::errors::{LadderError, LadderResult};
use super::types::LevelUpdate;

/// One item produced by a market feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedItem {
    Levels(LevelUpdate),
    Price { price: Decimal },
}

/// Source of level updates and prices
#[async_trait]
pub trait MarketFeed: Send {
    /// Start producing items
    async fn subscribe(&mut self) -> LadderResult<UnboundedReceiver<FeedItem>>;

    /// Stop producing items; the channel closes afterwards
    async fn unsubscribe(&mut self) -> LadderResult<()>;
}

#[derive(Debug, Clone)]
enum ReplaySource {
    File(PathBuf),
    Items(Vec<FeedItem>),
}

/// Replays recorded items with a fixed delay between them
#[derive(Debug)]
pub struct ReplayFeed {
    source: ReplaySource,
    delay: Duration,
    task: Option<JoinHandle<()>>,
}

impl ReplayFeed {
    /// Replay a JSON-lines file
    pub fn from_file(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            source: ReplaySource::File(path.into()),
            delay,
            task: None,
        }
    }

    /// Replay items held in memory
    pub fn from_items(items: Vec<FeedItem>, delay: Duration) -> Self {
        Self {
            source: ReplaySource::Items(items),
            delay,
            task: None,
        }
    }

    /// Parse JSON lines, skipping blank lines and `#` comments
    pub fn parse_lines(content: &str) -> LadderResult<Vec<FeedItem>> {
        content
            .lines()
            .enumerate()
            .map(|(no, line)| (no + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(no, line)| {
                serde_json::from_str(line)
                    .map_err(|e| LadderError::Feed(format!("line {}: {}", no, e)))
            })
            .collect()
    }

    async fn load(&self) -> LadderResult<Vec<FeedItem>> {
        match &self.source {
            ReplaySource::Items(items) => Ok(items.clone()),
            ReplaySource::File(path) => {
                let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                    LadderError::Feed(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::parse_lines(&content)
            }
        }
    }
}

#[async_trait]
impl MarketFeed for ReplayFeed {
    async fn subscribe(&mut self) -> LadderResult<UnboundedReceiver<FeedItem>> {
        if self.task.is_some() {
            return Err(LadderError::Feed("replay already subscribed".into()));
        }

        let items = self.load().await?;
        info!("Replaying {} feed items", items.len());

        let (tx, rx) = unbounded_channel();
        let delay = self.delay;
        self.task = Some(tokio::spawn(async move {
            for item in items {
                if tx.send(item).is_err() {
                    debug!("Replay receiver dropped");
                    return;
                }
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            debug!("Replay finished");
        }));
        Ok(rx)
    }

    async fn unsubscribe(&mut self) -> LadderResult<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}
