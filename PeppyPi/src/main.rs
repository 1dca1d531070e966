mod console;
mod logging;

use std::sync::Arc;

use anyhow::{Context, Result};
use peppyconfig::get_config;
use peppyplayer::{PlayerFacade, PlayerStatus};
use tracing::info;

fn main() -> Result<()> {
    // ========== PHASE 1 : Configuration & logging ==========
    let config = get_config();
    logging::init_logging(&config);
    info!("⚙️ Configuration loaded from {}", config.directory());

    // ========== PHASE 2 : Player backend ==========
    let player = PlayerFacade::from_config(&config).context("Cannot build player backend")?;
    info!("🎵 Player backend: {}", player.kind());

    player.add_player_listener(Arc::new(|status: &PlayerStatus| {
        info!("▶️ Player status {}", status.to_json());
    }));
    player.add_volume_listener(Arc::new(|volume: &u8| {
        info!("🔊 Volume {}", volume);
    }));
    player.add_end_of_track_listener(Arc::new(|_: &()| {
        info!("⏹️ End of track");
    }));

    player.start_client();

    // ========== PHASE 3 : Control console ==========
    println!("{}", console::HELP);
    let result = console::run(&player);

    player.stop_client();
    info!("👋 PeppyPi stopped");
    result
}
