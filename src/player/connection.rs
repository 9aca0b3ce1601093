//! Supervisor del enlace de voz.
//!
//! Consume las transiciones del enlace como una cola ordenada de eventos y
//! decide entre reconectar y desmontar. Las tres piezas delicadas:
//!
//! - el cierre 4014 es ambiguo (expulsión o cambio de canal) y se resuelve
//!   con una sonda de 5 segundos;
//! - las desconexiones recuperables reintentan con espera lineal hasta
//!   agotar el cupo;
//! - una conexión que no llega a Ready en 20 segundos se da por muerta.
//!
//! El teardown se notifica exactamente una vez por sesión.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Cierre websocket que Discord usa tanto para expulsión como para cambio
/// de canal.
pub const AMBIGUOUS_CLOSE_CODE: u16 = 4014;

/// Ventana para distinguir expulsión de cambio de canal.
const KICK_PROBE: Duration = Duration::from_secs(5);

/// Tiempo máximo para que una conexión nueva llegue a Ready.
const READY_TIMEOUT: Duration = Duration::from_secs(20);

/// Reintentos de rejoin antes de rendirse.
const MAX_REJOIN_ATTEMPTS: u32 = 5;

/// Por qué se cayó el enlace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Cierre websocket con código conocido.
    CloseCode(u16),
    /// Cualquier otra causa (red, driver).
    Other,
}

/// Transiciones observables del enlace de voz.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    Signalling,
    Connecting,
    Ready { channel_id: Option<u64> },
    Disconnected { cause: DisconnectCause },
    Destroyed,
}

/// Operaciones que el supervisor puede pedirle al enlace real.
#[async_trait]
pub trait VoiceLink: Send + Sync + 'static {
    /// Reintenta la conexión. `channel_id` es el último canal observado en
    /// Ready, si hubo alguno: tras un cambio de canal el rejoin debe ir al
    /// canal nuevo, no al de la conexión original.
    async fn rejoin(&self, channel_id: Option<u64>) -> bool;

    /// Desmonta el enlace. Debe ser idempotente.
    async fn destroy(&self);
}

/// Callbacks del dueño de la sesión.
#[async_trait]
pub trait SupervisorHooks: Send + Sync + 'static {
    /// La conexión terminó para siempre. Se invoca exactamente una vez.
    async fn connection_ended(&self);
}

enum WaitOutcome {
    Matched,
    TimedOut,
    Ended,
}

pub struct ConnectionSupervisor<L, H>
where
    L: VoiceLink,
    H: SupervisorHooks,
{
    link: Arc<L>,
    hooks: Arc<H>,
    events: mpsc::UnboundedReceiver<LinkState>,
    /// Eventos desplazados durante una espera acotada, pendientes de proceso.
    pending: VecDeque<LinkState>,
    /// Último canal reportado por un Ready; destino de los rejoin.
    channel: Option<u64>,
    rejoin_attempts: u32,
    finished: bool,
}

impl<L, H> ConnectionSupervisor<L, H>
where
    L: VoiceLink,
    H: SupervisorHooks,
{
    pub fn new(link: Arc<L>, hooks: Arc<H>, events: mpsc::UnboundedReceiver<LinkState>) -> Self {
        Self {
            link,
            hooks,
            events,
            pending: VecDeque::new(),
            channel: None,
            rejoin_attempts: 0,
            finished: false,
        }
    }

    /// Bucle del supervisor; corre hasta que el enlace muere o el emisor
    /// cierra el canal.
    pub async fn run(mut self) {
        while !self.finished {
            let Some(event) = self.next_event().await else {
                break;
            };
            self.handle(event).await;
        }
    }

    async fn next_event(&mut self) -> Option<LinkState> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }
        self.events.recv().await
    }

    async fn handle(&mut self, event: LinkState) {
        debug!("🔌 Transición del enlace: {:?}", event);

        match event {
            LinkState::Ready { channel_id } => {
                info!("✅ Enlace de voz listo (canal {:?})", channel_id);
                if channel_id.is_some() {
                    self.channel = channel_id;
                }
                self.rejoin_attempts = 0;
            }

            LinkState::Destroyed => {
                self.terminate().await;
            }

            LinkState::Disconnected { cause } => {
                if cause == DisconnectCause::CloseCode(AMBIGUOUS_CLOSE_CODE) {
                    self.resolve_ambiguous_close().await;
                } else {
                    self.try_rejoin().await;
                }
            }

            LinkState::Signalling | LinkState::Connecting => {
                self.await_ready().await;
            }
        }
    }

    /// Cierre 4014: si en la ventana de sonda el enlace vuelve a moverse es
    /// un cambio de canal; el silencio significa expulsión.
    async fn resolve_ambiguous_close(&mut self) {
        info!("🔍 Cierre ambiguo (4014), sondeando {}s", KICK_PROBE.as_secs());

        let outcome = self
            .wait_for(KICK_PROBE, |e| {
                matches!(
                    e,
                    LinkState::Signalling | LinkState::Connecting | LinkState::Ready { .. }
                )
            })
            .await;

        match outcome {
            WaitOutcome::Matched => {
                info!("🔀 Fue un cambio de canal, el enlace sigue vivo");
            }
            WaitOutcome::TimedOut => {
                info!("👢 Expulsados del canal de voz");
                self.terminate().await;
            }
            WaitOutcome::Ended => {}
        }
    }

    /// Desconexión recuperable: espera lineal y rejoin, hasta agotar cupo.
    async fn try_rejoin(&mut self) {
        if self.rejoin_attempts >= MAX_REJOIN_ATTEMPTS {
            warn!("❌ Reintentos de reconexión agotados ({})", MAX_REJOIN_ATTEMPTS);
            self.terminate().await;
            return;
        }

        let delay = Duration::from_secs(u64::from(self.rejoin_attempts + 1) * 5);
        info!(
            "🔄 Reconectando en {}s (intento {}/{})",
            delay.as_secs(),
            self.rejoin_attempts + 1,
            MAX_REJOIN_ATTEMPTS
        );

        // La espera sigue drenando eventos: un Destroyed durante el backoff
        // corta aquí mismo.
        if matches!(self.wait_for(delay, |_| false).await, WaitOutcome::Ended) {
            return;
        }

        self.rejoin_attempts += 1;
        if !self.link.rejoin(self.channel).await {
            warn!("⚠️ El rejoin no pudo iniciarse");
        }
    }

    /// Conexión en marcha: acotar el tiempo hasta Ready.
    async fn await_ready(&mut self) {
        let outcome = self
            .wait_for(READY_TIMEOUT, |e| matches!(e, LinkState::Ready { .. }))
            .await;

        if matches!(outcome, WaitOutcome::TimedOut) {
            warn!("⏰ La conexión no llegó a Ready en {}s", READY_TIMEOUT.as_secs());
            self.terminate().await;
        }
    }

    /// Espera acotada sobre el mismo canal de eventos.
    ///
    /// El evento que cumple `matches` se devuelve a la cola para procesarse
    /// con el manejador normal. Durante la espera, `Destroyed` termina la
    /// sesión, las desconexiones se difieren, y los Signalling/Connecting
    /// intermedios se descartan (ya hay una espera en curso; rearmarlos
    /// duplicaría el temporizador).
    async fn wait_for<F>(&mut self, window: Duration, matches: F) -> WaitOutcome
    where
        F: Fn(&LinkState) -> bool,
    {
        let deadline = tokio::time::Instant::now() + window;

        loop {
            let event = match tokio::time::timeout_at(deadline, self.events.recv()).await {
                Err(_) => return WaitOutcome::TimedOut,
                Ok(None) => return WaitOutcome::Ended,
                Ok(Some(event)) => event,
            };

            if matches(&event) {
                self.pending.push_front(event);
                return WaitOutcome::Matched;
            }

            match event {
                LinkState::Destroyed => {
                    self.terminate().await;
                    return WaitOutcome::Ended;
                }
                LinkState::Disconnected { .. } => self.pending.push_back(event),
                LinkState::Signalling | LinkState::Connecting => {}
                LinkState::Ready { channel_id } => {
                    if channel_id.is_some() {
                        self.channel = channel_id;
                    }
                    self.rejoin_attempts = 0;
                }
            }
        }
    }

    /// Teardown único: desmonta el enlace y avisa al dueño.
    async fn terminate(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        info!("🛑 Enlace de voz terminado");
        self.link.destroy().await;
        self.hooks.connection_ended().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeLink {
        rejoins: AtomicUsize,
        destroys: AtomicUsize,
        targets: parking_lot::Mutex<Vec<Option<u64>>>,
    }

    #[async_trait]
    impl VoiceLink for FakeLink {
        async fn rejoin(&self, channel_id: Option<u64>) -> bool {
            self.rejoins.fetch_add(1, Ordering::SeqCst);
            self.targets.lock().push(channel_id);
            true
        }

        async fn destroy(&self) {
            self.destroys.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct FakeHooks {
        ended: AtomicUsize,
    }

    #[async_trait]
    impl SupervisorHooks for FakeHooks {
        async fn connection_ended(&self) {
            self.ended.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spawn_supervisor() -> (
        mpsc::UnboundedSender<LinkState>,
        Arc<FakeLink>,
        Arc<FakeHooks>,
        tokio::task::JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = Arc::new(FakeLink::default());
        let hooks = Arc::new(FakeHooks::default());
        let sup = ConnectionSupervisor::new(link.clone(), hooks.clone(), rx);
        let handle = tokio::spawn(sup.run());
        (tx, link, hooks, handle)
    }

    fn kicked() -> LinkState {
        LinkState::Disconnected {
            cause: DisconnectCause::CloseCode(AMBIGUOUS_CLOSE_CODE),
        }
    }

    fn dropped() -> LinkState {
        LinkState::Disconnected {
            cause: DisconnectCause::Other,
        }
    }

    async fn settle() {
        // Deja correr el supervisor con el tiempo pausado
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_4014_is_a_kick() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        tx.send(kicked()).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(link.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_4014_followed_by_activity_is_a_move() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        tx.send(kicked()).unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        tx.send(LinkState::Connecting).unwrap();
        tx.send(LinkState::Ready { channel_id: Some(99) }).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(link.destroys.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_backoff_is_linear() {
        let (tx, link, _, _) = spawn_supervisor();

        // Primer intento: espera de (0+1)*5 = 5s
        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 1);

        // Segundo intento: (1+1)*5 = 10s
        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_targets_last_observed_channel() {
        let (tx, link, _, _) = spawn_supervisor();

        tx.send(LinkState::Ready { channel_id: Some(7) }).unwrap();
        settle().await;
        // Cambio de canal: el Ready siguiente trae el canal nuevo
        tx.send(LinkState::Ready { channel_id: Some(42) }).unwrap();
        settle().await;
        // Un Ready sin canal no borra el último conocido
        tx.send(LinkState::Ready { channel_id: None }).unwrap();
        settle().await;

        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        assert_eq!(link.targets.lock().as_slice(), [Some(42)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_resets_rejoin_budget() {
        let (tx, link, _, _) = spawn_supervisor();

        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 2);

        tx.send(LinkState::Ready { channel_id: Some(1) }).unwrap();
        settle().await;

        // Tras Ready el siguiente backoff vuelve a ser de 5s
        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_budget_exhaustion_tears_down() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        for _ in 0..MAX_REJOIN_ATTEMPTS {
            tx.send(dropped()).unwrap();
            // backoff máximo es 25s; sobra
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        assert_eq!(link.rejoins.load(Ordering::SeqCst), 5);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 0);

        tx.send(dropped()).unwrap();
        settle().await;

        assert_eq!(link.rejoins.load(Ordering::SeqCst), 5);
        assert_eq!(link.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_that_never_readies_dies_at_20s() {
        let (tx, link, hooks, _) = spawn_supervisor();

        tx.send(LinkState::Signalling).unwrap();
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(link.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_within_window_survives() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        tx.send(LinkState::Signalling).unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        tx.send(LinkState::Ready { channel_id: Some(7) }).unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(link.destroys.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_intermediate_transitions_do_not_rearm_ready_timer() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        // Signalling arma la espera; el Connecting intermedio no debe armar
        // una segunda que mate la conexión después del Ready.
        tx.send(LinkState::Signalling).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(LinkState::Connecting).unwrap();
        tokio::time::sleep(Duration::from_secs(18)).await;
        tx.send(LinkState::Ready { channel_id: Some(3) }).unwrap();
        tokio::time::sleep(Duration::from_secs(40)).await;

        assert_eq!(link.destroys.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 0);
        assert!(!handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_ends_exactly_once() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        tx.send(LinkState::Destroyed).unwrap();
        tx.send(LinkState::Destroyed).unwrap();
        settle().await;

        assert_eq!(link.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroyed_during_backoff_cuts_the_wait() {
        let (tx, link, hooks, handle) = spawn_supervisor();

        tx.send(dropped()).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(LinkState::Destroyed).unwrap();
        settle().await;

        assert_eq!(link.rejoins.load(Ordering::SeqCst), 0);
        assert_eq!(hooks.ended.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
    }
}
