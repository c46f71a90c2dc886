//! Slot Ladder Bot Binary
//!
//! Replays a recorded level/price feed through a paper-traded slot ladder.
//!
//! ## Setup
//!
//! 1. Create a config file and a JSON-lines feed (see `demos/config.toml`
//!    and `demos/feed.jsonl`).
//!
//! 2. Optionally override settings through `.env` or the environment:
//!    ```
//!    APP_LADDER__VOLUME=2
//!    APP_SESSION__CUTOFF=20:00:00
//!    ```
//!
//! 3. Run the bot:
//!    ```bash
//!    cargo run --bin ladder_bot -- config.toml
//!    ```

use log::{error, info};

use slot_ladder::runner::LadderRunner;

#[tokio::main]
async fn main() {
    // Load .env file before settings read the environment
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to read .env: {}", e);
        }
    }

    let args: Vec<String> = std::env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("config.toml");
    if !std::path::Path::new(config_path).exists() {
        eprintln!("Config file '{}' not found. Please create one.", config_path);
        std::process::exit(1);
    }

    let runner = match LadderRunner::new(config_path) {
        Ok(runner) => runner,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Runner initialises env_logger from the configured level
    match runner.run().await {
        Ok(snapshot) => {
            info!(
                "Finished: long {:?}, short {:?}",
                snapshot.summary.long, snapshot.summary.short
            );
        }
        Err(e) => {
            error!("Ladder execution error: {}", e);
            std::process::exit(1);
        }
    }
}
