//! Productor de streams: supervisa el pipeline externo de decodificación.
//!
//! Un track se convierte en audio lanzando `yt-dlp` con salida a stdout y,
//! cuando hace falta ganancia, encadenando un `ffmpeg` con filtro `volume`.
//! Los procesos viven dentro del `ChildContainer` de songbird, que los mata
//! al soltarse: cualquier ruta de error que abandone el stream libera el
//! subproceso sin contabilidad manual.

use async_trait::async_trait;
use songbird::input::{
    codecs::{get_codec_registry, get_probe},
    ChildContainer, Input,
};
use std::process::{Command, Stdio};
use tracing::{debug, error, info};

use super::track::Track;
use super::{ResourceError, StreamProducer};

/// Límite de descarga; evita que yt-dlp sature la conexión.
const RATE_LIMIT: &str = "100K";

/// Productor respaldado por yt-dlp + ffmpeg.
pub struct YtDlpProducer;

impl YtDlpProducer {
    pub fn new() -> Self {
        Self
    }

    /// Verifica que yt-dlp y ffmpeg estén disponibles.
    pub async fn verify_dependencies() -> anyhow::Result<()> {
        let ytdlp = tokio::process::Command::new("yt-dlp")
            .arg("--version")
            .output()
            .await;

        match ytdlp {
            Ok(output) if output.status.success() => {
                let version = String::from_utf8_lossy(&output.stdout);
                info!("✅ yt-dlp versión: {}", version.trim());
            }
            _ => {
                error!("❌ yt-dlp no está instalado o no está en PATH");
                anyhow::bail!("yt-dlp no disponible");
            }
        }

        let ffmpeg = tokio::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await;

        match ffmpeg {
            Ok(output) if output.status.success() => {
                info!("✅ ffmpeg disponible");
            }
            _ => {
                error!("❌ ffmpeg no encontrado");
                anyhow::bail!("ffmpeg no disponible");
            }
        }

        Ok(())
    }
}

/// Argumentos de yt-dlp para un track en `offset_secs`.
///
/// El seek se delega al downloader ffmpeg (`-ss` sobre la entrada) para que
/// ocurra a nivel de fuente, no decodificando y descartando.
fn ytdlp_args(url: &str, offset_secs: u64) -> Vec<String> {
    let mut args: Vec<String> = [
        "--output",
        "-",
        "--quiet",
        "--no-progress",
        "--format",
        "bestaudio",
        "--rate-limit",
        RATE_LIMIT,
        "--no-check-certificates",
        "--no-cache-dir",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    if offset_secs > 0 {
        args.push("--downloader".into());
        args.push("ffmpeg".into());
        args.push("--downloader-args".into());
        args.push(format!("ffmpeg_i:-ss {}", offset_secs));
    }

    args.push(url.to_string());
    args
}

/// Etapa de ganancia: ffmpeg leyendo de stdin, filtro `volume`, wav a stdout.
fn ffmpeg_gain_args(volume: f32) -> Vec<String> {
    vec![
        "-nostdin".into(),
        "-loglevel".into(),
        "quiet".into(),
        "-i".into(),
        "pipe:0".into(),
        "-af".into(),
        format!("volume={}", volume),
        "-f".into(),
        "wav".into(),
        "pipe:1".into(),
    ]
}

fn needs_gain_stage(volume: f32) -> bool {
    (volume - 1.0).abs() > f32::EPSILON
}

/// Lanza el pipeline de procesos y lo envuelve en su contenedor.
fn spawn_pipeline(url: &str, volume: f32, offset_secs: u64) -> Result<ChildContainer, ResourceError> {
    debug!("🚀 Lanzando yt-dlp para {} (offset {}s, vol {})", url, offset_secs, volume);

    let mut downloader = Command::new("yt-dlp")
        .args(ytdlp_args(url, offset_secs))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(ResourceError::Spawn)?;

    if needs_gain_stage(volume) {
        let Some(download_out) = downloader.stdout.take() else {
            let _ = downloader.kill();
            return Err(ResourceError::NoOutput);
        };

        let gain = Command::new("ffmpeg")
            .args(ffmpeg_gain_args(volume))
            .stdin(Stdio::from(download_out))
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn();

        match gain {
            Ok(gain) => Ok(ChildContainer::from(vec![downloader, gain])),
            Err(e) => {
                let _ = downloader.kill();
                Err(ResourceError::Spawn(e))
            }
        }
    } else {
        if downloader.stdout.is_none() {
            let _ = downloader.kill();
            return Err(ResourceError::NoOutput);
        }
        Ok(ChildContainer::from(downloader))
    }
}

#[async_trait]
impl StreamProducer for YtDlpProducer {
    type Stream = Input;

    async fn produce(
        &self,
        track: &Track,
        volume: f32,
        offset_secs: u64,
    ) -> Result<Input, ResourceError> {
        let url = track.playback_url();
        let container = spawn_pipeline(&url, volume, offset_secs)?;

        // El probe consume cabecera del stream; si no reconoce el formato,
        // el drop del Input mata los procesos del contenedor.
        Input::from(container)
            .make_playable_async(get_codec_registry(), get_probe())
            .await
            .map_err(|e| ResourceError::Probe(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_without_offset_have_no_seek() {
        let args = ytdlp_args("https://youtu.be/abc", 0);
        assert!(!args.iter().any(|a| a == "--downloader"));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
        assert!(args.contains(&"--rate-limit".to_string()));
        assert!(args.contains(&"bestaudio".to_string()));
    }

    #[test]
    fn test_args_with_offset_seek_at_source() {
        let args = ytdlp_args("https://youtu.be/abc", 90);
        let pos = args.iter().position(|a| a == "--downloader-args").unwrap();
        assert_eq!(args[pos + 1], "ffmpeg_i:-ss 90");
        // la URL sigue siendo el último argumento
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc");
    }

    #[test]
    fn test_gain_stage_only_when_volume_differs() {
        assert!(!needs_gain_stage(1.0));
        assert!(needs_gain_stage(0.5));
        assert!(needs_gain_stage(1.5));
    }

    #[test]
    fn test_gain_args_carry_volume_filter() {
        let args = ffmpeg_gain_args(1.5);
        assert!(args.contains(&"volume=1.5".to_string()));
        assert_eq!(args.last().unwrap(), "pipe:1");
    }
}
