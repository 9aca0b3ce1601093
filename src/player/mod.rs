//! Núcleo de reproducción: cola, motor, productor de streams y supervisor
//! de conexión.
//!
//! El motor ([`engine::QueueEngine`]) es genérico sobre tres costuras para
//! poder probarse sin Discord:
//!
//! - [`StreamProducer`]: convierte un track en un stream de audio vivo
//!   (en producción, un subproceso yt-dlp/ffmpeg).
//! - [`AudioOutput`]: el reproductor de un solo slot (en producción, el
//!   `Call` de songbird).
//! - [`Notifier`]: el colaborador de mensajería; solo recibe datos planos.

pub mod connection;
pub mod engine;
pub mod output;
pub mod producer;
pub mod queue;
pub mod track;

use async_trait::async_trait;
use thiserror::Error;

use track::Track;

/// Estado observable del reproductor de audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

/// Eventos que el reproductor entrega al motor.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    /// El reproductor cambió de estado (fin natural incluido: `-> Idle`).
    StateChange(PlayerState),
    /// El recurso falló después del hand-off; solo se notifica al usuario.
    Failure(String),
}

/// Fallos al producir un stream vivo para un track.
///
/// Siempre se recuperan vía la política de reintentos del motor; nunca se
/// propagan crudos al usuario más allá de un aviso transitorio.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no se pudo lanzar el proceso de descarga: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("el proceso no entregó una salida legible")]
    NoOutput,

    #[error("no se pudo detectar el formato del stream: {0}")]
    Probe(String),
}

/// Fallos de operaciones sobre la cola disparadas por comandos.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("índice fuera de rango")]
    InvalidIndex,
}

/// Convierte un track en un stream de audio reproducible.
#[async_trait]
pub trait StreamProducer: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Lanza el pipeline externo para `track` comenzando en `offset_secs`
    /// con la ganancia `volume` aplicada en la etapa de decodificación.
    ///
    /// Invariante: si falla, el subproceso lanzado (si lo hubo) ya fue
    /// terminado antes de devolver el error.
    async fn produce(
        &self,
        track: &Track,
        volume: f32,
        offset_secs: u64,
    ) -> Result<Self::Stream, ResourceError>;
}

/// Reproductor de un solo slot: como mucho un recurso activo.
#[async_trait]
pub trait AudioOutput: Send + Sync + 'static {
    type Stream: Send + 'static;

    /// Entrega un stream al reproductor. Reemplaza (y libera) el recurso
    /// anterior si lo hubiera.
    async fn play(&self, stream: Self::Stream);

    /// Pausa; devuelve `false` si no había nada activo.
    async fn pause(&self) -> bool;

    /// Reanuda; devuelve `false` si no había nada activo.
    async fn resume(&self) -> bool;

    /// Detiene el recurso activo. Dispara el evento `Idle` correspondiente.
    async fn stop(&self);

    /// Segundos reproducidos del recurso activo (sin contar el offset).
    async fn elapsed_secs(&self) -> Option<u64>;

    /// Suelta el recurso activo sin esperar eventos. Limpieza defensiva.
    async fn release_current(&self);
}

/// Colaborador de mensajería. El motor solo aporta datos planos; el
/// formato (embeds, toasts auto-borrables) vive del otro lado.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Un track empezó a sonar.
    async fn now_playing(&self, track: &Track);

    /// El track actual terminó; retirar el estado "now playing".
    async fn playback_finished(&self);

    /// Aviso transitorio de error de reproducción (auto-borrable).
    async fn playback_error(&self, message: &str);
}
