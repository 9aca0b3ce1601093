//! Spotify sin credenciales: la página de embed lleva un JSON
//! `__NEXT_DATA__` con los metadatos, y cada pista se convierte en una
//! búsqueda de YouTube.

use futures::stream::{self, StreamExt};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use super::{ytdlp, ResolutionError, Resolved};

/// Búsquedas de YouTube simultáneas al volcar una playlist.
const SEARCH_CONCURRENCY: usize = 4;

/// Resuelve una URL de Spotify (pista o playlist) a tracks de YouTube.
pub async fn resolve(http: &reqwest::Client, url: &str) -> Result<Resolved, ResolutionError> {
    let embed = embed_url(url);
    debug!("🟢 Leyendo embed de Spotify: {}", embed);

    let body = http.get(&embed).send().await?.text().await?;

    let entity = extract_entity(&body)
        .ok_or_else(|| ResolutionError::Scrape("la página de Spotify no trae metadatos".into()))?;

    if entity["type"] == "playlist" {
        let terms = playlist_search_terms(&entity);
        if terms.is_empty() {
            return Err(ResolutionError::Scrape(
                "la playlist de Spotify está vacía".into(),
            ));
        }

        // Cada pista se busca en YouTube; las que no aparecen se omiten.
        let tracks: Vec<_> = stream::iter(terms)
            .map(|term| async move {
                match ytdlp::search(&term).await {
                    Ok(track) => Some(track),
                    Err(e) => {
                        warn!("⚠️ Sin resultado para '{}': {}", term, e);
                        None
                    }
                }
            })
            .buffered(SEARCH_CONCURRENCY)
            .filter_map(|t| async move { t })
            .collect()
            .await;

        if tracks.is_empty() {
            return Err(ResolutionError::Scrape(
                "ninguna pista de la playlist se encontró en YouTube".into(),
            ));
        }

        return Ok(Resolved::Many {
            tracks,
            origin: "la playlist de Spotify".to_string(),
        });
    }

    let term = track_search_term(&entity)
        .ok_or_else(|| ResolutionError::Scrape("pista de Spotify sin título".into()))?;
    let track = ytdlp::search(&term).await?;
    Ok(Resolved::Single(track))
}

/// Normaliza a la URL de embed: quita `?si=` e inserta `/embed/`.
fn embed_url(url: &str) -> String {
    let url = url.split("?si=").next().unwrap_or(url);
    if url.contains("/embed/") {
        url.to_string()
    } else {
        url.replacen(".com/", ".com/embed/", 1)
    }
}

/// Saca la entidad (pista o playlist) del JSON `__NEXT_DATA__`.
fn extract_entity(body: &str) -> Option<Value> {
    let re = Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json">(.*?)</script>"#)
        .ok()?;
    let json: Value = serde_json::from_str(re.captures(body)?.get(1)?.as_str()).ok()?;
    let entity = json
        .pointer("/props/pageProps/state/data/entity")?
        .clone();
    Some(entity)
}

/// "artista & artista - título" para una pista suelta.
fn track_search_term(entity: &Value) -> Option<String> {
    let title = entity["title"].as_str()?;
    let artists: Vec<&str> = entity["artists"]
        .as_array()
        .map(|a| a.iter().filter_map(|x| x["name"].as_str()).collect())
        .unwrap_or_default();

    if artists.is_empty() {
        Some(title.to_string())
    } else {
        Some(format!("{} - {}", artists.join(" & "), title))
    }
}

/// "subtítulo - título" por cada elemento del trackList de la playlist.
fn playlist_search_terms(entity: &Value) -> Vec<String> {
    entity["trackList"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let title = item["title"].as_str()?;
                    match item["subtitle"].as_str() {
                        Some(subtitle) if !subtitle.is_empty() => {
                            Some(format!("{} - {}", subtitle, title))
                        }
                        _ => Some(title.to_string()),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}
