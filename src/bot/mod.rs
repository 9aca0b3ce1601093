//! Manejador principal del bot: mensajes con prefijo, estado de voz y
//! ciclo de vida de las sesiones.

use serenity::all::{Context, EventHandler, Message, Ready, VoiceState};
use serenity::async_trait;
use serenity::builder::CreateMessage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod commands;
pub mod handlers;

use crate::config::Config;
use crate::lyrics::LyricsClient;
use crate::session::SessionRegistry;
use crate::sources::Resolver;
use crate::storage::JsonStorage;
use crate::ui::embeds;

pub struct MixcordBot {
    pub config: Arc<Config>,
    pub storage: Arc<JsonStorage>,
    pub registry: Arc<SessionRegistry>,
    pub resolver: Arc<Resolver>,
    pub lyrics: Arc<LyricsClient>,
}

impl MixcordBot {
    pub fn new(config: Config, storage: Arc<JsonStorage>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            registry,
            resolver: Arc::new(Resolver::new()),
            lyrics: Arc::new(LyricsClient::new()),
        }
    }
}

#[async_trait]
impl EventHandler for MixcordBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("✅ Conectado como {}", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let settings = self.storage.get(guild_id.get());
        let Some(parsed) = commands::parse(&msg.content, &settings.prefix) else {
            return;
        };

        debug!("💬 Comando {:?} en guild {}", parsed.command, guild_id);
        if let Err(e) = handlers::dispatch(self, &ctx, &msg, parsed, &settings).await {
            warn!("❌ Comando fallido: {:#}", e);
            let embed = embeds::create_error_embed(&e.to_string());
            let _ = msg
                .channel_id
                .send_message(&ctx.http, CreateMessage::new().embed(embed))
                .await;
        }
    }

    /// Vigila el canal de la sesión: vacío arma la salida diferida (sin
    /// reiniciar una cuenta ya en marcha), gente de vuelta la cancela.
    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(session) = self.registry.get(guild_id) else {
            return;
        };

        let listeners = {
            let Some(guild) = ctx.cache.guild(guild_id) else {
                return;
            };
            let bot_id = ctx.cache.current_user().id;
            let Some(bot_channel) = guild
                .voice_states
                .get(&bot_id)
                .and_then(|vs| vs.channel_id)
            else {
                return;
            };

            guild
                .voice_states
                .values()
                .filter(|vs| vs.channel_id == Some(bot_channel) && vs.user_id != bot_id)
                .count()
        };

        if listeners == 0 {
            let settings = self.storage.get(guild_id.get());
            session.arm_leave_timer(Duration::from_secs(settings.leave_delay_secs));
        } else {
            session.cancel_leave_timer();
        }
    }
}
