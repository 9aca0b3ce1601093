//! Motor de cola: convierte "siguiente elemento" en un recurso vivo, de uno
//! en uno, y reacciona a las transiciones del reproductor.
//!
//! La exclusión mutua es el flag `in_flight`: mientras hay una producción en
//! vuelo ningún otro `advance` puede sacar nada de la cola. El flag se
//! libera por guard de drop en todas las salidas; la única excepción es
//! `stop()`, que deja el motor parado para lo que queda de sesión.

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::queue::{PlaybackQueue, QueuePage};
use super::track::Track;
use super::{AudioOutput, Notifier, PlayerEvent, PlayerState, QueueError, StreamProducer};

/// Reintentos por elemento antes de declararlo envenenado y descartarlo.
const MAX_PRODUCE_RETRIES: u32 = 5;

#[derive(Debug)]
struct EngineState {
    queue: PlaybackQueue,
    current: Option<Track>,
    player: PlayerState,
    in_flight: bool,
    stopped: bool,
    looping: bool,
    volume: f32,
}

/// Datos planos del track sonando, para el display.
#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub title: String,
    pub elapsed_secs: u64,
    pub total_secs: u64,
}

/// Resultado de un skip: qué cayó.
#[derive(Debug, Clone)]
pub struct SkipOutcome {
    pub skipped_title: String,
    pub extra_dropped: usize,
}

pub struct QueueEngine<P, O>
where
    P: StreamProducer,
    O: AudioOutput<Stream = P::Stream>,
{
    state: Arc<Mutex<EngineState>>,
    producer: Arc<P>,
    output: Arc<O>,
    notifier: Arc<dyn Notifier>,
}

/// Libera `in_flight` en el drop; toda adquisición pasa por aquí.
struct FlightGuard {
    state: Arc<Mutex<EngineState>>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.state.lock().in_flight = false;
    }
}

impl<P, O> QueueEngine<P, O>
where
    P: StreamProducer,
    O: AudioOutput<Stream = P::Stream>,
{
    pub fn new(producer: Arc<P>, output: Arc<O>, notifier: Arc<dyn Notifier>, volume: f32) -> Self {
        Self {
            state: Arc::new(Mutex::new(EngineState {
                queue: PlaybackQueue::new(),
                current: None,
                player: PlayerState::Idle,
                in_flight: false,
                stopped: false,
                looping: false,
                volume,
            })),
            producer,
            output,
            notifier,
        }
    }

    /// Añade un track e intenta avanzar.
    pub async fn enqueue(&self, track: Track) {
        self.state.lock().queue.enqueue(track);
        self.advance().await;
    }

    /// Añade varios tracks (playlist / mix) con un único intento de avance.
    pub async fn enqueue_all(&self, tracks: Vec<Track>) {
        {
            let mut st = self.state.lock();
            for track in tracks {
                st.queue.enqueue(track);
            }
        }
        self.advance().await;
    }

    /// Intenta convertir la cabeza de la cola en un recurso vivo.
    ///
    /// De un solo vuelo: si ya hay una producción en curso o el reproductor
    /// no está en reposo, no hace nada. En fallo, el elemento vuelve a la
    /// cabeza hasta `MAX_PRODUCE_RETRIES` veces y después se descarta,
    /// reiniciando el presupuesto para el siguiente.
    pub async fn advance(&self) {
        let mut retry: u32 = 0;

        loop {
            let (guard, track, volume) = {
                let mut st = self.state.lock();
                if st.in_flight || st.stopped || st.player != PlayerState::Idle {
                    return;
                }

                st.current = None;
                let Some(track) = st.queue.dequeue_head() else {
                    debug!("📭 Cola vacía, motor en reposo");
                    return;
                };

                st.in_flight = true;
                st.current = Some(track.clone());
                (
                    FlightGuard {
                        state: self.state.clone(),
                    },
                    track,
                    st.volume,
                )
            };

            // Limpieza defensiva: nunca dos recursos vivos por sesión.
            self.output.release_current().await;

            let offset = track.start_offset_secs;
            match self.producer.produce(&track, volume, offset).await {
                Ok(stream) => {
                    info!("🎵 Reproduciendo: {}", track.title);
                    self.output.play(stream).await;
                    // El driver lo confirmará con su propio evento; marcarlo
                    // ya evita que un advance concurrente doble-reproduzca.
                    self.state.lock().player = PlayerState::Playing;
                    drop(guard);
                    return;
                }
                Err(e) => {
                    warn!("⚠️ Producción fallida para {} (intento {}): {}", track.title, retry + 1, e);
                    self.notifier.playback_error(&e.to_string()).await;

                    {
                        let mut st = self.state.lock();
                        if retry < MAX_PRODUCE_RETRIES {
                            // El elemento problemático reintenta desde la
                            // cabeza, no desde el final.
                            st.queue.requeue_front(track);
                        } else {
                            info!("☠️ Track irreproducible descartado: {}", track.title);
                            st.current = None;
                        }
                    }

                    retry = if retry < MAX_PRODUCE_RETRIES { retry + 1 } else { 0 };
                    drop(guard);
                }
            }
        }
    }

    /// Transiciones del reproductor. El fin natural (`-> Idle`) dispara el
    /// siguiente avance; `Playing` actualiza el display.
    pub async fn handle_player_event(&self, event: PlayerEvent) {
        match event {
            PlayerEvent::StateChange(new) => {
                let old = {
                    let mut st = self.state.lock();
                    let old = st.player;
                    st.player = new;
                    old
                };

                match new {
                    PlayerState::Idle if old != PlayerState::Idle => {
                        self.notifier.playback_finished().await;

                        {
                            let mut st = self.state.lock();
                            if st.looping {
                                if let Some(mut again) = st.current.take() {
                                    again.start_offset_secs = 0;
                                    st.queue.requeue_front(again);
                                }
                            }
                        }

                        self.advance().await;
                    }
                    PlayerState::Playing => {
                        let track = self.state.lock().current.clone();
                        if let Some(track) = track {
                            self.notifier.now_playing(&track).await;
                        }
                    }
                    _ => {}
                }
            }
            PlayerEvent::Failure(message) => {
                warn!("❌ Error del reproductor: {}", message);
                self.notifier.playback_error(&message).await;
            }
        }
    }

    /// Reconstruye el recurso vivo en `offset_secs` sin tocar la cola ni el
    /// presupuesto de reintentos (seek y cambio de volumen).
    async fn rebuild_at(&self, offset_secs: u64) -> Result<()> {
        let (track, volume) = {
            let mut st = self.state.lock();
            let Some(current) = st.current.as_mut() else {
                anyhow::bail!("no hay nada en reproducción");
            };
            current.start_offset_secs = offset_secs;
            (current.clone(), st.volume)
        };

        let stream = self.producer.produce(&track, volume, offset_secs).await?;
        // play() reemplaza y libera el recurso anterior
        self.output.play(stream).await;
        self.state.lock().player = PlayerState::Playing;
        Ok(())
    }

    /// Salta a `timestamp_secs`, recortado a la duración nominal. Devuelve
    /// el destino efectivo.
    pub async fn seek(&self, timestamp_secs: u64) -> Result<u64> {
        let clamped = {
            let st = self.state.lock();
            let Some(current) = st.current.as_ref() else {
                anyhow::bail!("no hay nada en reproducción");
            };
            timestamp_secs.min(current.nominal_length_secs)
        };

        self.rebuild_at(clamped).await?;
        Ok(clamped)
    }

    /// Cambia la ganancia. Si hay un track sonando, reconstruye el recurso
    /// manteniendo el offset transcurrido.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        let resume_at = {
            let mut st = self.state.lock();
            st.volume = volume;
            st.current.as_ref().map(|c| c.start_offset_secs)
        };

        if let Some(start_offset) = resume_at {
            let elapsed = self.output.elapsed_secs().await.unwrap_or(0);
            self.rebuild_at(start_offset + elapsed).await?;
        }

        Ok(())
    }

    /// Detiene el track actual; con `count`, descarta además hasta
    /// `count - 1` elementos próximos de la cola.
    pub async fn skip(&self, count: Option<usize>) -> Result<SkipOutcome> {
        let outcome = {
            let mut st = self.state.lock();
            if st.player == PlayerState::Idle {
                anyhow::bail!("no hay nada en reproducción");
            }

            let skipped_title = st
                .current
                .as_ref()
                .map(|t| t.title.clone())
                .unwrap_or_else(|| "---".to_string());

            let extra_dropped = match count {
                Some(n) if n > 1 => st.queue.drop_from_head(n - 1),
                _ => 0,
            };

            SkipOutcome {
                skipped_title,
                extra_dropped,
            }
        };

        // El stop provoca el evento Idle, y este el siguiente advance.
        self.output.stop().await;
        Ok(outcome)
    }

    pub async fn pause(&self) -> bool {
        if self.state.lock().player == PlayerState::Idle {
            return false;
        }
        self.output.pause().await
    }

    pub async fn resume(&self) -> bool {
        if self.state.lock().player == PlayerState::Idle {
            return false;
        }
        self.output.resume().await
    }

    /// Teardown definitivo: el motor queda parado para siempre, la cola se
    /// vacía y el reproductor se detiene. Solo al morir la sesión.
    pub async fn stop(&self) {
        {
            let mut st = self.state.lock();
            st.stopped = true;
            st.queue.clear();
            st.current = None;
        }
        self.output.stop().await;
    }

    pub fn toggle_loop(&self) -> bool {
        let mut st = self.state.lock();
        st.looping = !st.looping;
        st.looping
    }

    pub fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    pub fn player_state(&self) -> PlayerState {
        self.state.lock().player
    }

    pub async fn now_playing(&self) -> Option<NowPlaying> {
        let track = {
            let st = self.state.lock();
            if st.player == PlayerState::Idle {
                return None;
            }
            st.current.clone()?
        };

        let elapsed = self.output.elapsed_secs().await.unwrap_or(0) + track.start_offset_secs;
        Some(NowPlaying {
            title: track.title,
            elapsed_secs: elapsed,
            total_secs: track.nominal_length_secs,
        })
    }

    // Operaciones de cola disparadas por comandos; la validación de índices
    // vive en PlaybackQueue.

    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn remove_track(&self, index: usize) -> Result<Track, QueueError> {
        self.state.lock().queue.remove(index)
    }

    pub fn move_track(&self, from: usize, to: usize) -> Result<String, QueueError> {
        let mut st = self.state.lock();
        st.queue.move_track(from, to).map(|t| t.title.clone())
    }

    pub fn shuffle_queue(&self) {
        self.state.lock().queue.shuffle();
        info!("🔀 Cola barajada");
    }

    pub fn clear_queue(&self) {
        self.state.lock().queue.clear();
    }

    pub fn queue_page(&self, input: Option<&str>) -> Option<QueuePage> {
        self.state.lock().queue.page(input)
    }

    #[cfg(test)]
    fn queue_titles(&self) -> Vec<String> {
        self.state.lock().queue.titles()
    }

    #[cfg(test)]
    fn current_title(&self) -> Option<String> {
        self.state.lock().current.as_ref().map(|t| t.title.clone())
    }
}
