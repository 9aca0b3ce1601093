//! Lado songbird del reproductor: el slot único de audio y los puentes de
//! eventos hacia el motor y el supervisor.
//!
//! El punto delicado es el filtrado por uuid: al reconstruir un recurso
//! (seek, volumen) el track saliente emite su evento de fin igualmente, y
//! sin filtro el motor lo tomaría por un fin natural y avanzaría la cola.
//! Solo los eventos del handle vigente pasan.

use async_trait::async_trait;
use songbird::events::context_data::DisconnectReason;
use songbird::events::{Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent};
use songbird::id::{ChannelId, GuildId};
use songbird::input::Input;
use songbird::model::CloseCode;
use songbird::tracks::TrackHandle;
use songbird::{Call, CoreEvent, Songbird};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::connection::{DisconnectCause, LinkState, VoiceLink, AMBIGUOUS_CLOSE_CODE};
use super::{AudioOutput, PlayerEvent, PlayerState};

/// Reproductor de un solo slot respaldado por un `Call` de songbird.
pub struct SongbirdOutput {
    call: Arc<tokio::sync::Mutex<Call>>,
    current: Arc<parking_lot::Mutex<Option<TrackHandle>>>,
    events: mpsc::UnboundedSender<PlayerEvent>,
}

impl SongbirdOutput {
    pub fn new(call: Arc<tokio::sync::Mutex<Call>>, events: mpsc::UnboundedSender<PlayerEvent>) -> Self {
        Self {
            call,
            current: Arc::new(parking_lot::Mutex::new(None)),
            events,
        }
    }
}

#[async_trait]
impl AudioOutput for SongbirdOutput {
    type Stream = Input;

    async fn play(&self, stream: Input) {
        let handle = self.call.lock().await.play_input(stream);

        // El slot apunta al nuevo handle antes de parar el viejo: así su
        // evento de fin llega ya desfasado y el filtro lo descarta.
        let previous = {
            let mut slot = self.current.lock();
            slot.replace(handle.clone())
        };

        for (event, kind) in [
            (TrackEvent::Play, RelayKind::Playing),
            (TrackEvent::Pause, RelayKind::Paused),
            (TrackEvent::End, RelayKind::Ended),
            (TrackEvent::Error, RelayKind::Errored),
        ] {
            let relay = TrackRelay {
                uuid: handle.uuid(),
                current: self.current.clone(),
                kind,
                tx: self.events.clone(),
            };
            if let Err(e) = handle.add_event(Event::Track(event), relay) {
                warn!("⚠️ No se pudo registrar el evento de track: {}", e);
            }
        }

        if let Some(previous) = previous {
            let _ = previous.stop();
        }
    }

    async fn pause(&self) -> bool {
        let handle = self.current.lock().clone();
        match handle {
            Some(h) => h.pause().is_ok(),
            None => false,
        }
    }

    async fn resume(&self) -> bool {
        let handle = self.current.lock().clone();
        match handle {
            Some(h) => h.play().is_ok(),
            None => false,
        }
    }

    async fn stop(&self) {
        // El handle se queda en el slot: su evento de fin debe pasar el
        // filtro para que el motor avance.
        let handle = self.current.lock().clone();
        if let Some(h) = handle {
            let _ = h.stop();
        }
    }

    async fn elapsed_secs(&self) -> Option<u64> {
        let handle = self.current.lock().clone()?;
        handle.get_info().await.ok().map(|info| info.position.as_secs())
    }

    async fn release_current(&self) {
        let handle = self.current.lock().take();
        if let Some(h) = handle {
            let _ = h.stop();
        }
    }
}

#[derive(Clone, Copy)]
enum RelayKind {
    Playing,
    Paused,
    Ended,
    Errored,
}

/// Reenvía eventos de un track concreto al motor, descartando los de
/// handles ya reemplazados.
struct TrackRelay {
    uuid: Uuid,
    current: Arc<parking_lot::Mutex<Option<TrackHandle>>>,
    kind: RelayKind,
    tx: mpsc::UnboundedSender<PlayerEvent>,
}

#[async_trait]
impl VoiceEventHandler for TrackRelay {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        let is_current = self
            .current
            .lock()
            .as_ref()
            .map(|h| h.uuid() == self.uuid)
            .unwrap_or(false);

        if !is_current {
            debug!("🫥 Evento de un track reemplazado, descartado");
            return None;
        }

        match self.kind {
            RelayKind::Playing => {
                let _ = self.tx.send(PlayerEvent::StateChange(PlayerState::Playing));
            }
            RelayKind::Paused => {
                let _ = self.tx.send(PlayerEvent::StateChange(PlayerState::Paused));
            }
            RelayKind::Ended => {
                let _ = self.tx.send(PlayerEvent::StateChange(PlayerState::Idle));
            }
            RelayKind::Errored => {
                let _ = self
                    .tx
                    .send(PlayerEvent::Failure("el recurso de audio falló".into()));
                let _ = self.tx.send(PlayerEvent::StateChange(PlayerState::Idle));
            }
        }

        None
    }
}

/// Reenvía los eventos del driver de voz como transiciones del enlace.
pub struct DriverRelay {
    tx: mpsc::UnboundedSender<LinkState>,
}

impl DriverRelay {
    /// Registra el relay sobre un `Call` para los tres eventos del driver.
    pub async fn attach(call: &Arc<tokio::sync::Mutex<Call>>, tx: mpsc::UnboundedSender<LinkState>) {
        let mut call = call.lock().await;
        for core in [
            CoreEvent::DriverConnect,
            CoreEvent::DriverReconnect,
            CoreEvent::DriverDisconnect,
        ] {
            call.add_global_event(Event::Core(core), DriverRelay { tx: tx.clone() });
        }
    }
}

#[async_trait]
impl VoiceEventHandler for DriverRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let state = match ctx {
            EventContext::DriverConnect(data) | EventContext::DriverReconnect(data) => {
                LinkState::Ready {
                    channel_id: data.channel_id.map(|c| c.0.get()),
                }
            }
            EventContext::DriverDisconnect(data) => {
                let cause = match &data.reason {
                    Some(DisconnectReason::WsClosed(Some(code))) => {
                        if matches!(code, CloseCode::Disconnected) {
                            DisconnectCause::CloseCode(AMBIGUOUS_CLOSE_CODE)
                        } else {
                            DisconnectCause::Other
                        }
                    }
                    _ => DisconnectCause::Other,
                };
                LinkState::Disconnected { cause }
            }
            _ => return None,
        };

        let _ = self.tx.send(state);
        None
    }
}

/// Enlace de voz real: el supervisor manda, songbird ejecuta.
pub struct SongbirdLink {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    /// Canal de destino vigente; un cambio de canal lo actualiza vía el
    /// `channel_id` del rejoin.
    channel_id: parking_lot::Mutex<ChannelId>,
}

impl SongbirdLink {
    pub fn new(manager: Arc<Songbird>, guild_id: GuildId, channel_id: ChannelId) -> Self {
        Self {
            manager,
            guild_id,
            channel_id: parking_lot::Mutex::new(channel_id),
        }
    }
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn rejoin(&self, channel_id: Option<u64>) -> bool {
        if let Some(id) = channel_id.and_then(std::num::NonZeroU64::new) {
            *self.channel_id.lock() = ChannelId(id);
        }

        let target = *self.channel_id.lock();
        match self.manager.join(self.guild_id, target).await {
            Ok(_) => true,
            Err(e) => {
                warn!("⚠️ Rejoin fallido: {}", e);
                false
            }
        }
    }

    async fn destroy(&self) {
        if self.manager.get(self.guild_id).is_some() {
            if let Err(e) = self.manager.remove(self.guild_id).await {
                debug!("el enlace ya estaba desmontado: {}", e);
            }
        }
    }
}
