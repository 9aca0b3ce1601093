//! Resolución de lo que escribe el usuario a tracks encolables.
//!
//! Cuatro formas de entrada: URL de vídeo, URL de playlist, URL de mix
//! (lista autogenerada `RD...`) y términos de búsqueda. Las URLs de Spotify
//! se traducen a búsquedas de YouTube.

pub mod spotify;
pub mod ytdlp;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::player::track::Track;

/// La fuente no pudo convertirse en algo reproducible. Se muestra al
/// usuario tal cual; la cola no se toca.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("no se pudo lanzar yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("yt-dlp terminó con error: {0}")]
    Tool(String),

    #[error("sin resultados para: {0}")]
    NoResults(String),

    #[error("la playlist está vacía o no es accesible")]
    EmptyPlaylist,

    #[error("no se pudo leer el mix")]
    EmptyMix,

    #[error("error de red al resolver la fuente: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Scrape(String),
}

/// Resultado de resolver la entrada del usuario.
#[derive(Debug)]
pub enum Resolved {
    Single(Track),
    /// Varios tracks con una descripción del origen ("la playlist", "el mix").
    Many { tracks: Vec<Track>, origin: String },
}

pub struct Resolver {
    http: reqwest::Client,
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Resuelve `query` a uno o varios tracks. `mix_items` limita cuántos
    /// elementos se toman de un mix autogenerado.
    pub async fn resolve(&self, query: &str, mix_items: usize) -> Result<Resolved, ResolutionError> {
        let query = query.trim();

        if query.contains("open.spotify.com") {
            return spotify::resolve(&self.http, query).await;
        }

        let Ok(parsed) = Url::parse(query) else {
            // No es una URL: búsqueda
            info!("🔍 Buscando: {}", query);
            let track = ytdlp::search(query).await?;
            return Ok(Resolved::Single(track));
        };

        if let Some(list_id) = playlist_id(&parsed) {
            if list_id.starts_with("RD") {
                info!("🎛️ Resolviendo mix de YouTube ({} elementos)", mix_items);
                let tracks = ytdlp::resolve_mix(query, mix_items).await?;
                return Ok(Resolved::Many {
                    tracks,
                    origin: "el mix".to_string(),
                });
            }

            info!("📋 Resolviendo playlist de YouTube");
            let tracks = ytdlp::resolve_playlist(query).await?;
            return Ok(Resolved::Many {
                tracks,
                origin: "la playlist".to_string(),
            });
        }

        let track = ytdlp::resolve_single(query).await?;
        Ok(Resolved::Single(track))
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Valor del parámetro `list=` si la URL lo lleva.
fn playlist_id(url: &Url) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == "list")
        .map(|(_, value)| value.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_playlist_id_extraction() {
        let url = Url::parse("https://www.youtube.com/watch?v=abc&list=PL123").unwrap();
        assert_eq!(playlist_id(&url), Some("PL123".to_string()));

        let plain = Url::parse("https://youtu.be/abc").unwrap();
        assert_eq!(playlist_id(&plain), None);
    }

    #[test]
    fn test_mix_lists_start_with_rd() {
        let url = Url::parse("https://www.youtube.com/watch?v=abc&list=RDabc").unwrap();
        assert!(playlist_id(&url).unwrap().starts_with("RD"));
    }
}
