//! Búsqueda de letras sin credenciales: Genius primero, Musixmatch como
//! respaldo. Cada proveedor que falla o no encuentra nada cede el turno al
//! siguiente; solo si todos fallan se reporta que no hay letra.

use anyhow::{Context, Result};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:85.0) Gecko/20100101 Firefox/85.0";

#[derive(Debug, Clone)]
pub enum LyricsResult {
    Found { text: String, source_url: String },
    NotFound,
}

pub struct LyricsClient {
    http: reqwest::Client,
}

impl LyricsClient {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Busca la letra de `query` probando los proveedores en orden.
    pub async fn find(&self, query: &str) -> LyricsResult {
        let q: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();

        match self.from_genius(&q).await {
            Ok(Some(found)) => return found,
            Ok(None) => debug!("Genius no tiene letra para: {}", query),
            Err(e) => warn!("⚠️ Genius falló: {}", e),
        }

        match self.from_musixmatch(&q).await {
            Ok(Some(found)) => return found,
            Ok(None) => debug!("Musixmatch tampoco tiene: {}", query),
            Err(e) => warn!("⚠️ Musixmatch falló: {}", e),
        }

        LyricsResult::NotFound
    }

    async fn get(&self, url: &str) -> Result<String> {
        Ok(self
            .http
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept-Language", "en-US,en;q=0.5")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    /// API de búsqueda de Genius + scrape de la página de la canción.
    async fn from_genius(&self, q: &str) -> Result<Option<LyricsResult>> {
        let search_url = format!("https://genius.com/api/search/song?page=1&q={}", q);
        let body = self.get(&search_url).await?;
        let json: Value = serde_json::from_str(&body).context("respuesta de Genius ilegible")?;

        let Some(path) = json
            .pointer("/response/sections/0/hits/0/result/path")
            .and_then(|p| p.as_str())
        else {
            return Ok(None);
        };

        let page_url = format!("https://genius.com{}", path);
        let page = self.get(&page_url).await?;

        Ok(extract_genius_lyrics(&page).map(|text| LyricsResult::Found {
            text,
            source_url: page_url,
        }))
    }

    /// Búsqueda de Musixmatch + scrape del primer resultado.
    async fn from_musixmatch(&self, q: &str) -> Result<Option<LyricsResult>> {
        let search_url = format!("https://www.musixmatch.com/search/{}", q);
        let body = self.get(&search_url).await?;

        let Some(href) = extract_musixmatch_href(&body) else {
            return Ok(None);
        };

        let page_url = format!("https://www.musixmatch.com{}", href);
        let page = self.get(&page_url).await?;

        Ok(extract_musixmatch_lyrics(&page).map(|text| LyricsResult::Found {
            text,
            source_url: page_url,
        }))
    }
}

impl Default for LyricsClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Junta los contenedores `data-lyrics-container` de la página de Genius.
fn extract_genius_lyrics(body: &str) -> Option<String> {
    let re = Regex::new(r#"(?s)<div[^>]*data-lyrics-container="true"[^>]*>(.*?)</div>"#).ok()?;

    let mut lyrics = String::new();
    for cap in re.captures_iter(body) {
        lyrics.push_str(&strip_html(&cap[1]));
        lyrics.push('\n');
    }

    let lyrics = lyrics.trim().to_string();
    if lyrics.is_empty() {
        None
    } else {
        Some(lyrics)
    }
}

/// Href del primer resultado de búsqueda de Musixmatch.
fn extract_musixmatch_href(body: &str) -> Option<String> {
    let re = Regex::new(r#"(?s)class="media-card-title"[^>]*>.*?href="([^"]+)""#).ok()?;
    re.captures(body).map(|cap| cap[1].to_string())
}

/// Bloques de letra de la página de canción de Musixmatch.
fn extract_musixmatch_lyrics(body: &str) -> Option<String> {
    let re = Regex::new(r#"(?s)class="lyrics__content__ok"[^>]*>(.*?)</span>"#).ok()?;

    let blocks: Vec<String> = re
        .captures_iter(body)
        .map(|cap| strip_html(&cap[1]))
        .collect();

    let lyrics = blocks.join("\n").trim().to_string();
    if lyrics.is_empty() {
        None
    } else {
        Some(lyrics)
    }
}

/// Pasa un fragmento de HTML a texto plano: `<br>` son saltos de línea, el
/// resto de etiquetas desaparece y se decodifican las entidades comunes.
fn strip_html(fragment: &str) -> String {
    let br = Regex::new(r"(?i)<br\s*/?>").expect("regex válida");
    let tags = Regex::new(r"<[^>]+>").expect("regex válida");

    let text = br.replace_all(fragment, "\n");
    let text = tags.replace_all(&text, "");

    text.replace("&amp;", "&")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#039;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_html() {
        let html = "Hola<br>mundo <i>cursiva</i> &amp; m&#x27;s";
        assert_eq!(strip_html(html), "Hola\nmundo cursiva & m's");
    }

    #[test]
    fn test_extract_genius_containers() {
        let body = concat!(
            r#"<div data-lyrics-container="true" class="x">Linea 1<br>Linea 2</div>"#,
            r#"<div class="other">no</div>"#,
            r#"<div data-lyrics-container="true">Linea 3</div>"#,
        );
        assert_eq!(
            extract_genius_lyrics(body).unwrap(),
            "Linea 1\nLinea 2\nLinea 3"
        );
    }

    #[test]
    fn test_extract_genius_empty_page() {
        assert!(extract_genius_lyrics("<html><body>nada</body></html>").is_none());
    }

    #[test]
    fn test_extract_musixmatch_href() {
        let body = r#"<h2 class="media-card-title"><a class="title" href="/lyrics/Artista/Cancion"><span>Canción</span></a></h2>"#;
        assert_eq!(
            extract_musixmatch_href(body).unwrap(),
            "/lyrics/Artista/Cancion"
        );
    }

    #[test]
    fn test_extract_musixmatch_lyrics_joins_blocks() {
        let body = concat!(
            r#"<span class="lyrics__content__ok">Verso uno</span>"#,
            r#"<span class="lyrics__content__ok">Verso dos</span>"#,
        );
        assert_eq!(
            extract_musixmatch_lyrics(body).unwrap(),
            "Verso uno\nVerso dos"
        );
    }
}
