//! Resolución de metadatos con yt-dlp en modo `--print`.
//!
//! Cada línea que imprime yt-dlp es `id|duración|título`; la duración puede
//! ser `NA` en streams en vivo.

use tokio::process::Command;
use tracing::debug;

use super::ResolutionError;
use crate::player::track::Track;

const PRINT_FORMAT: &str = "%(id)s|%(duration)s|%(title)s";

async fn run_ytdlp(args: &[String]) -> Result<String, ResolutionError> {
    debug!("🚀 yt-dlp {}", args.join(" "));

    let output = Command::new("yt-dlp")
        .args(args)
        .output()
        .await
        .map_err(ResolutionError::Spawn)?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ResolutionError::Tool(stderr.trim().to_string()));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn base_args() -> Vec<String> {
    [
        "--quiet",
        "--print",
        PRINT_FORMAT,
        "--no-check-certificates",
        "--no-cache-dir",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Resuelve un vídeo suelto; ignora cualquier lista que acompañe a la URL.
pub async fn resolve_single(url: &str) -> Result<Track, ResolutionError> {
    let mut args = base_args();
    args.push("--no-playlist".into());
    args.push(url.to_string());

    let stdout = run_ytdlp(&args).await?;
    parse_print_output(&stdout)
        .into_iter()
        .next()
        .ok_or_else(|| ResolutionError::NoResults(url.to_string()))
}

/// Primer resultado de búsqueda de YouTube.
pub async fn search(term: &str) -> Result<Track, ResolutionError> {
    let mut args = base_args();
    args.push(format!("ytsearch1:{}", term));

    let stdout = run_ytdlp(&args).await?;
    parse_print_output(&stdout)
        .into_iter()
        .next()
        .ok_or_else(|| ResolutionError::NoResults(term.to_string()))
}

/// Todos los elementos de una playlist, sin descargar nada.
pub async fn resolve_playlist(url: &str) -> Result<Vec<Track>, ResolutionError> {
    let mut args = base_args();
    args.push("--flat-playlist".into());
    args.push(url.to_string());

    let stdout = run_ytdlp(&args).await?;
    let tracks = parse_print_output(&stdout);
    if tracks.is_empty() {
        return Err(ResolutionError::EmptyPlaylist);
    }
    Ok(tracks)
}

/// Primeros `mix_items` elementos de un mix autogenerado.
pub async fn resolve_mix(url: &str, mix_items: usize) -> Result<Vec<Track>, ResolutionError> {
    let mut args = base_args();
    args.push("--flat-playlist".into());
    args.push("--playlist-items".into());
    args.push(format!("1:{}", mix_items));
    args.push(url.to_string());

    let stdout = run_ytdlp(&args).await?;
    let tracks = parse_print_output(&stdout);
    if tracks.is_empty() {
        return Err(ResolutionError::EmptyMix);
    }
    Ok(tracks)
}

/// Parsea la salida `--print` línea a línea; las líneas malformadas se
/// descartan.
fn parse_print_output(stdout: &str) -> Vec<Track> {
    stdout.lines().filter_map(parse_print_line).collect()
}

fn parse_print_line(line: &str) -> Option<Track> {
    let mut parts = line.splitn(3, '|');
    let id = parts.next()?.trim();
    let duration = parts.next()?.trim();
    let title = parts.next()?.trim();

    if id.is_empty() || title.is_empty() {
        return None;
    }

    // "NA" (en vivo) y decimales cuentan como segundos enteros
    let secs = duration.parse::<f64>().map(|d| d as u64).unwrap_or(0);
    Some(Track::new(id, title, secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_line() {
        let track = parse_print_line("dQw4w9WgXcQ|212|Never Gonna Give You Up").unwrap();
        assert_eq!(track.source_ref, "dQw4w9WgXcQ");
        assert_eq!(track.nominal_length_secs, 212);
        assert_eq!(track.title, "Never Gonna Give You Up");
    }

    #[test]
    fn test_parse_line_title_may_contain_separator() {
        let track = parse_print_line("abc|10|Uno | Dos").unwrap();
        assert_eq!(track.title, "Uno | Dos");
    }

    #[test]
    fn test_parse_line_live_stream_has_no_duration() {
        let track = parse_print_line("abc|NA|Radio 24/7").unwrap();
        assert_eq!(track.nominal_length_secs, 0);
    }

    #[test]
    fn test_parse_line_fractional_duration() {
        let track = parse_print_line("abc|211.5|x").unwrap();
        assert_eq!(track.nominal_length_secs, 211);
    }

    #[test]
    fn test_parse_output_skips_garbage_lines() {
        let out = "abc|10|Uno\nbasura\n|5|sin id\ndef|20|Dos\n";
        let tracks = parse_print_output(out);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].title, "Dos");
    }

    #[test]
    fn test_single_args_disable_playlist() {
        let mut args = base_args();
        args.push("--no-playlist".into());
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&PRINT_FORMAT.to_string()));
    }
}
