use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tracing::{error, info};

mod bot;
mod config;
mod lyrics;
mod player;
mod session;
mod sources;
mod storage;
mod ui;
mod utils;

use crate::bot::MixcordBot;
use crate::config::Config;
use crate::player::producer::YtDlpProducer;
use crate::session::SessionRegistry;
use crate::storage::JsonStorage;

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mixcord=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Mixcord v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    // Sin yt-dlp y ffmpeg no hay nada que hacer
    YtDlpProducer::verify_dependencies().await?;

    let storage = Arc::new(JsonStorage::new(config.data_dir.clone()).await?);

    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let registry = Arc::new(SessionRegistry::new());
    let handler = MixcordBot::new(config.clone(), storage, registry.clone());

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Shutdown graceful: las sesiones vivas sueltan sus enlaces y
    // subprocesos antes de morir el proceso
    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Error al registrar Ctrl+C");
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        registry.shutdown_all();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        std::process::exit(0);
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
