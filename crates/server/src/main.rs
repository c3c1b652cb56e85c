//! MUSH Softcode Console
//!
//! Runs the evaluator and command queue against an in-memory world and
//! reads commands from stdin as the seeded wizard.

mod commands;

use anyhow::Result;
use commands::Engine;
use mush_config::{EngineConfig, DEFAULT_CONFIG_PATH};
use mush_core::{Dbref, World};
use mush_queue::now_secs;
use mush_world::MemoryWorld;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// How often the queue is serviced
const TICK: Duration = Duration::from_millis(100);

/// Objects created at startup
struct Seeded {
    wizard: Dbref,
    player: Dbref,
    thing: Dbref,
}

fn seed_world(world: &MemoryWorld) -> Seeded {
    let wizard = world.create_player("Wizard", true);
    let player = world.create_player("Guest", false);
    let thing = world.create_thing("Widget", player);
    world.set_attr(thing, "DESC", "A small brass widget.");
    Seeded {
        wizard,
        player,
        thing,
    }
}

/// Print pending messages, tagging those meant for someone else
fn print_output(engine: &Engine, console: Dbref) {
    for (target, message) in engine.drain_output() {
        if target == console {
            println!("{}", message);
        } else {
            println!("[{}] {}", engine.world().name(target), message);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("MUSH softcode console starting up...");
    info!("Loading configuration from {}...", DEFAULT_CONFIG_PATH);

    let config = match EngineConfig::load_default() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            warn!("Failed to load {}: {}", DEFAULT_CONFIG_PATH, e);
            warn!("   Using default configuration");
            EngineConfig::default()
        }
    };
    config.display();
    let config = Arc::new(config);

    let world = Arc::new(MemoryWorld::new());
    let seeded = seed_world(&world);
    info!(
        "Seeded world: wizard {}, player {}, thing {}",
        seeded.wizard, seeded.player, seeded.thing
    );

    let console = seeded.wizard;
    let engine = Arc::new(Mutex::new(Engine::new(world, Arc::clone(&config))));

    // Time of the last console line; the queue runs faster while someone is typing.
    let last_input = Arc::new(AtomicI64::new(0));

    let ticker = {
        let engine = Arc::clone(&engine);
        let last_input = Arc::clone(&last_input);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                let now = now_secs();
                let chunk = if now - last_input.load(Ordering::Relaxed) <= 1 {
                    config.active_q_chunk
                } else {
                    config.idle_q_chunk
                };
                let mut guard = engine.lock();
                guard.tick(now, chunk);
                print_output(&guard, console);
            }
        })
    };

    info!("Ready. Type commands, or QUIT to leave.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("QUIT") {
            break;
        }
        last_input.store(now_secs(), Ordering::Relaxed);
        let mut guard = engine.lock();
        guard.submit(console, line);
        print_output(&guard, console);
    }

    ticker.abort();
    info!(
        "Shutting down with {} queued commands",
        engine.lock().scheduler().len()
    );
    Ok(())
}
