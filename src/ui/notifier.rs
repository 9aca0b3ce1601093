//! Mensajería del canal de texto de la sesión.
//!
//! Mantiene como mucho un mensaje "reproduciendo" y un mensaje de cola
//! vivos por sesión: cada actualización borra el anterior. Los errores de
//! reproducción son avisos transitorios que se auto-borran.

use async_trait::async_trait;
use serenity::all::{ChannelId, Http, MessageId};
use serenity::builder::{CreateEmbed, CreateMessage};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::player::track::Track;
use crate::player::Notifier;
use crate::ui::embeds;

/// Vida de un aviso de error antes de auto-borrarse.
const ERROR_TOAST_TTL: Duration = Duration::from_secs(30);

pub struct ChannelNotifier {
    http: Arc<Http>,
    channel: ChannelId,
    now_playing_msg: parking_lot::Mutex<Option<MessageId>>,
    queue_msg: parking_lot::Mutex<Option<MessageId>>,
}

impl ChannelNotifier {
    pub fn new(http: Arc<Http>, channel: ChannelId) -> Self {
        Self {
            http,
            channel,
            now_playing_msg: parking_lot::Mutex::new(None),
            queue_msg: parking_lot::Mutex::new(None),
        }
    }

    async fn send_embed(&self, embed: CreateEmbed) -> Option<MessageId> {
        match self
            .channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            Ok(message) => Some(message.id),
            Err(e) => {
                debug!("no se pudo enviar el mensaje: {}", e);
                None
            }
        }
    }

    async fn delete_tracked(&self, slot: &parking_lot::Mutex<Option<MessageId>>) {
        let previous = slot.lock().take();
        if let Some(id) = previous {
            let _ = self.channel.delete_message(&self.http, id).await;
        }
    }

    /// Publica la página de la cola, reemplazando el listado anterior.
    pub async fn show_queue(&self, embed: CreateEmbed) {
        self.delete_tracked(&self.queue_msg).await;
        let id = self.send_embed(embed).await;
        *self.queue_msg.lock() = id;
    }

    /// Aviso efímero con embed de error.
    pub async fn toast_error(&self, message: &str) {
        let Some(id) = self.send_embed(embeds::create_error_embed(message)).await else {
            return;
        };

        let http = self.http.clone();
        let channel = self.channel;
        tokio::spawn(async move {
            tokio::time::sleep(ERROR_TOAST_TTL).await;
            let _ = channel.delete_message(&http, id).await;
        });
    }

    /// Despedida al morir la sesión; retira los mensajes vivos.
    pub async fn session_ended(&self) {
        self.delete_tracked(&self.now_playing_msg).await;
        self.delete_tracked(&self.queue_msg).await;
        let _ = self
            .send_embed(embeds::create_info_embed("👋 Hasta luego", "Sesión terminada"))
            .await;
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn now_playing(&self, track: &Track) {
        self.delete_tracked(&self.now_playing_msg).await;
        let id = self.send_embed(embeds::create_now_playing_embed(track)).await;
        *self.now_playing_msg.lock() = id;
    }

    async fn playback_finished(&self) {
        self.delete_tracked(&self.now_playing_msg).await;
    }

    async fn playback_error(&self, message: &str) {
        self.toast_error(message).await;
    }
}
