//! Sesión por guild: motor de cola, enlace de voz supervisado y
//! temporizador de salida por canal vacío.
//!
//! El registro de sesiones es propiedad del bot y se pasa explícitamente;
//! no hay estado global.

use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId, Http};
use songbird::Songbird;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::player::connection::{ConnectionSupervisor, LinkState, SupervisorHooks};
use crate::player::engine::QueueEngine;
use crate::player::output::{DriverRelay, SongbirdLink, SongbirdOutput};
use crate::player::producer::YtDlpProducer;
use crate::ui::notifier::ChannelNotifier;

/// Motor concreto de producción: yt-dlp detrás, songbird delante.
pub type GuildEngine = QueueEngine<YtDlpProducer, SongbirdOutput>;

pub struct GuildSession {
    pub guild_id: GuildId,
    /// Canal de voz inicial de la sesión. Tras un cambio de canal, el
    /// supervisor y el enlace siguen al canal nuevo por su cuenta.
    pub voice_channel_id: ChannelId,
    /// Canal de texto donde nació la sesión; ahí van los avisos.
    pub text_channel_id: ChannelId,
    pub engine: Arc<GuildEngine>,
    pub notifier: Arc<ChannelNotifier>,
    link_tx: mpsc::UnboundedSender<LinkState>,
    leave_timer: LeaveTimer,
}

impl GuildSession {
    /// Conecta al canal de voz y levanta el motor y el supervisor.
    pub async fn connect(
        manager: Arc<Songbird>,
        http: Arc<Http>,
        registry: Arc<SessionRegistry>,
        guild_id: GuildId,
        voice_channel_id: ChannelId,
        text_channel_id: ChannelId,
        default_volume: f32,
    ) -> anyhow::Result<Arc<Self>> {
        let call = manager.join(guild_id, voice_channel_id).await?;

        let (player_tx, mut player_rx) = mpsc::unbounded_channel();
        let (link_tx, link_rx) = mpsc::unbounded_channel();

        DriverRelay::attach(&call, link_tx.clone()).await;

        let notifier = Arc::new(ChannelNotifier::new(http, text_channel_id));
        let output = Arc::new(SongbirdOutput::new(call, player_tx));
        let engine = Arc::new(QueueEngine::new(
            Arc::new(YtDlpProducer::new()),
            output,
            notifier.clone(),
            default_volume,
        ));

        let session = Arc::new(Self {
            guild_id,
            voice_channel_id,
            text_channel_id,
            engine: engine.clone(),
            notifier,
            link_tx: link_tx.clone(),
            leave_timer: LeaveTimer::new(),
        });

        // Bomba de eventos del reproductor hacia el motor
        {
            let engine = engine.clone();
            tokio::spawn(async move {
                while let Some(event) = player_rx.recv().await {
                    engine.handle_player_event(event).await;
                }
            });
        }

        // Supervisor del enlace
        let link = Arc::new(SongbirdLink::new(
            manager,
            guild_id.into(),
            voice_channel_id.into(),
        ));
        let hooks = Arc::new(SessionHooks {
            registry,
            guild_id,
            session: session.clone(),
        });
        tokio::spawn(ConnectionSupervisor::new(link, hooks, link_rx).run());

        // El join espera a que el enlace esté listo, y su DriverConnect se
        // emitió antes de enganchar el relay: se repone aquí. Las
        // transiciones posteriores llegan por el relay.
        let _ = link_tx.send(LinkState::Ready {
            channel_id: Some(voice_channel_id.get()),
        });

        info!("🎧 Sesión creada para guild {} en canal {}", guild_id, voice_channel_id);
        Ok(session)
    }

    /// Desmonta la sesión. El supervisor se encarga del resto del teardown.
    pub fn shutdown(&self) {
        self.cancel_leave_timer();
        let _ = self.link_tx.send(LinkState::Destroyed);
    }

    /// Arma la salida diferida por canal vacío. Una cuenta atrás ya en
    /// marcha no se reinicia: los eventos de voz repetidos no la posponen.
    pub fn arm_leave_timer(self: &Arc<Self>, delay: Duration) {
        let session = self.clone();
        let armed = self.leave_timer.arm(delay, async move {
            info!("👋 Canal vacío en guild {}, saliendo", session.guild_id);
            session.shutdown();
        });

        if armed {
            debug!("⏳ Salida programada en {}s para guild {}", delay.as_secs(), self.guild_id);
        }
    }

    pub fn cancel_leave_timer(&self) {
        if self.leave_timer.cancel() {
            debug!("⏳ Salida cancelada para guild {}", self.guild_id);
        }
    }
}

/// Cuenta atrás cancelable de un solo disparo.
struct LeaveTimer {
    handle: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl LeaveTimer {
    fn new() -> Self {
        Self {
            handle: parking_lot::Mutex::new(None),
        }
    }

    /// Arma la cuenta salvo que ya haya una en marcha; devuelve si quedó
    /// armada en esta llamada.
    fn arm<F>(&self, delay: Duration, on_fire: F) -> bool
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.handle.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }

        *slot = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire.await;
        }));
        true
    }

    /// Aborta la cuenta en marcha; devuelve si había alguna.
    fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

/// Teardown de la sesión cuando el enlace muere, venga de donde venga.
struct SessionHooks {
    registry: Arc<SessionRegistry>,
    guild_id: GuildId,
    session: Arc<GuildSession>,
}

#[async_trait::async_trait]
impl SupervisorHooks for SessionHooks {
    async fn connection_ended(&self) {
        self.session.cancel_leave_timer();
        self.session.engine.stop().await;
        self.session.notifier.session_ended().await;
        self.registry.remove(self.guild_id);
        info!("🧹 Sesión de guild {} desmontada", self.guild_id);
    }
}

/// Tabla de sesiones vivas, una por guild.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<GuildId, Arc<GuildSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.get(&guild_id).map(|s| s.clone())
    }

    pub fn insert(&self, session: Arc<GuildSession>) {
        self.sessions.insert(session.guild_id, session);
    }

    pub fn remove(&self, guild_id: GuildId) -> Option<Arc<GuildSession>> {
        self.sessions.remove(&guild_id).map(|(_, s)| s)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Desmonta todas las sesiones vivas (shutdown del proceso). Cada
    /// supervisor se encarga de liberar su enlace y sus subprocesos.
    pub fn shutdown_all(&self) {
        for entry in self.sessions.iter() {
            entry.value().shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_timer() -> (LeaveTimer, Arc<AtomicUsize>) {
        (LeaveTimer::new(), Arc::new(AtomicUsize::new(0)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_timer_rearm_does_not_reset_countdown() {
        let (timer, fired) = counting_timer();

        let f = fired.clone();
        assert!(timer.arm(Duration::from_secs(60), async move {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        // A mitad de cuenta llega otro evento de voz: no pospone la salida
        tokio::time::sleep(Duration::from_secs(30)).await;
        let f = fired.clone();
        assert!(!timer.arm(Duration::from_secs(60), async move {
            f.fetch_add(1, Ordering::SeqCst);
        }));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_timer_cancel_aborts_countdown() {
        let (timer, fired) = counting_timer();

        let f = fired.clone();
        timer.arm(Duration::from_secs(60), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(timer.cancel());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!timer.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_timer_rearms_after_firing() {
        let (timer, fired) = counting_timer();

        let f = fired.clone();
        timer.arm(Duration::from_secs(10), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let f = fired.clone();
        assert!(timer.arm(Duration::from_secs(10), async move {
            f.fetch_add(1, Ordering::SeqCst);
        }));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }
}
