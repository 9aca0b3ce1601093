//! Descriptor de un elemento reproducible.

/// Datos identificativos de un track más el offset de arranque.
///
/// El offset es lo único mutable: lo ajustan seek y los cambios de volumen
/// para que el siguiente recurso arranque donde tocaba.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    /// Referencia opaca para el resolvedor (URL o id de vídeo).
    pub source_ref: String,
    /// Título para mostrar.
    pub title: String,
    /// Duración nominal en segundos; 0 si no se conoce.
    pub nominal_length_secs: u64,
    /// Offset en segundos desde el que debe arrancar el próximo recurso.
    pub start_offset_secs: u64,
}

impl Track {
    pub fn new(source_ref: impl Into<String>, title: impl Into<String>, length_secs: u64) -> Self {
        Self {
            source_ref: source_ref.into(),
            title: title.into(),
            nominal_length_secs: length_secs,
            start_offset_secs: 0,
        }
    }

    /// URL reproducible por yt-dlp. Los ids de vídeo pelados se expanden.
    pub fn playback_url(&self) -> String {
        if self.source_ref.contains("://") {
            self.source_ref.clone()
        } else {
            format!("https://youtu.be/{}", self.source_ref)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_url() {
        let by_id = Track::new("dQw4w9WgXcQ", "x", 212);
        assert_eq!(by_id.playback_url(), "https://youtu.be/dQw4w9WgXcQ");

        let by_url = Track::new("https://music.youtube.com/watch?v=abc", "y", 0);
        assert_eq!(by_url.playback_url(), "https://music.youtube.com/watch?v=abc");
    }

    #[test]
    fn test_offset_defaults_to_zero() {
        let track = Track::new("a", "b", 10);
        assert_eq!(track.start_offset_secs, 0);
    }
}
