//! Host binary for the Hamlet village.
//!
//! Wires the conversation engine into a minimal simulation: a square grid,
//! villagers who wander it, and a proximity check that offers nearby pairs
//! a conversation. The dialogue manager is polled once per tick; ctrl-c
//! cancels everything in flight and exits.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `hamlet-config.yaml` (or `HAMLET_CONFIG`)
//! 3. Load oracle settings from the environment and build the client
//! 4. Load prompt templates (embedded, or `HAMLET_TEMPLATES_DIR`)
//! 5. Spawn seed villagers onto the grid
//! 6. Create the dialogue manager
//! 7. Install the ctrl-c handler
//! 8. Run the tick loop
//! 9. Log the result

mod config;
mod error;
mod runner;
mod spawner;
mod village;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hamlet_agents::ChanceWillingness;
use hamlet_dialogue::{DialogueManager, PromptEngine};
use hamlet_oracle::{OracleClient, OracleConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{CONFIG_PATH_VAR, DEFAULT_CONFIG_PATH, EngineConfig};
use crate::runner::Village;

/// Environment variable naming a directory of template overrides.
const TEMPLATES_DIR_VAR: &str = "HAMLET_TEMPLATES_DIR";

/// Environment variable selecting the log format (`json` or anything else).
const LOG_FORMAT_VAR: &str = "HAMLET_LOG_FORMAT";

/// Application entry point for the village engine.
///
/// # Errors
///
/// Returns an error if any initialization step fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Initialize structured logging.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var(LOG_FORMAT_VAR).is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!("hamlet-engine starting");

    // 2. Load configuration.
    let config_path =
        PathBuf::from(std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned()));
    let config = EngineConfig::load(&config_path)?;
    info!(
        path = %config_path.display(),
        seed = ?config.village.seed,
        grid_size = config.village.grid_size,
        tick_interval_ms = config.village.tick_interval_ms,
        secs_per_tick = config.village.secs_per_tick,
        max_turns = config.dialogue.max_turns_per_participant,
        worker_pool_size = config.dialogue.worker_pool_size,
        "Configuration loaded"
    );

    // 3. Build the oracle client.
    let oracle_config = OracleConfig::from_env()?;
    info!(
        fast_model = %oracle_config.fast_backend.model,
        smart_model = oracle_config.smart_backend.as_ref().map_or("(fast)", |b| b.model.as_str()),
        call_timeout = ?oracle_config.call_timeout,
        requests_per_window = oracle_config.budget.requests_per_window,
        tokens_per_window = oracle_config.budget.tokens_per_window,
        "Oracle configured"
    );
    let client = Arc::new(OracleClient::from_config(&oracle_config));

    // 4. Load prompt templates.
    let prompts = match std::env::var(TEMPLATES_DIR_VAR) {
        Ok(dir) => {
            info!(dir = %dir, "Loading prompt templates from directory");
            PromptEngine::from_dir(&PathBuf::from(dir))?
        }
        Err(_) => PromptEngine::with_defaults()?,
    };

    // 5. Spawn seed villagers.
    let mut rng = config
        .village
        .seed
        .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
    let world = spawner::spawn_villagers(&config.villagers, config.village.grid_size, &mut rng)?;
    info!(villagers = world.len(), "Seed villagers spawned");

    // 6. Create the dialogue manager.
    let willingness = config
        .village
        .seed
        .map_or_else(ChanceWillingness::new, ChanceWillingness::seeded);
    let manager = DialogueManager::new(
        config.dialogue,
        client,
        Arc::new(prompts),
        tokio::runtime::Handle::current(),
    )?
    .with_willingness(willingness);
    let village = Village::new(world, manager, config.village, rng);
    info!(
        villagers = village.world().len(),
        cooldown_secs = village.manager().config().cooldown_secs,
        "Village assembled, entering tick loop"
    );

    // 7. Install the ctrl-c handler.
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping after the current tick");
                    stop.store(true, Ordering::Release);
                }
                Err(e) => warn!(error = %e, "failed to listen for ctrl-c, stop with the tick limit"),
            }
        });
    }

    // 8. Run the village.
    let result = village.run(stop).await;

    // 9. Log results.
    runner::log_run_end(&result);
    info!("hamlet-engine shutdown complete");

    Ok(())
}
