use serenity::all::Timestamp;
use serenity::builder::{CreateEmbed, CreateEmbedFooter};

use crate::lyrics::LyricsResult;
use crate::player::engine::NowPlaying;
use crate::player::queue::QueuePage;
use crate::player::track::Track;
use crate::utils::seconds_to_hms;

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Mixcord";

fn display_length(secs: u64) -> String {
    if secs == 0 {
        "🔴 En vivo".to_string()
    } else {
        seconds_to_hms(secs)
    }
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", display_length(track.nominal_length_secs), true)
        .url(track.playback_url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**{}** se ha agregado a la cola", track.title))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", display_length(track.nominal_length_secs), true)
        .field("📊 Posición", position.to_string(), true)
        .url(track.playback_url())
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea un embed para mostrar que una playlist o mix fue agregado
pub fn create_tracks_added_embed(count: usize, origin: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("📋 Lista Agregada")
        .description(format!(
            "Se agregaron **{} canciones** de {} a la cola",
            count, origin
        ))
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed con una página de la cola de reproducción
pub fn create_queue_embed(page: Option<&QueuePage>, now: Option<&NowPlaying>) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if let Some(now) = now {
        embed = embed.field(
            "▶️ Sonando",
            format!(
                "**{}** `[{} / {}]`",
                now.title,
                seconds_to_hms(now.elapsed_secs),
                display_length(now.total_secs)
            ),
            false,
        );
    }

    match page {
        None => {
            embed = embed
                .description("😴 **La cola está vacía**\n\n💡 Usa `play <canción>` para agregar música")
                .color(colors::NEUTRAL_GRAY);
        }
        Some(page) => {
            let lines: Vec<String> = page
                .items
                .iter()
                .map(|(pos, track)| {
                    format!(
                        "`{}.` **{}** `[{}]`",
                        pos,
                        track.title,
                        display_length(track.nominal_length_secs)
                    )
                })
                .collect();

            embed = embed.description(lines.join("\n")).footer(CreateEmbedFooter::new(
                format!("📄 Página {} de {}", page.page + 1, page.page_count),
            ));
        }
    }

    embed.timestamp(Timestamp::now())
}

/// Crea un embed con la posición actual del track
pub fn create_now_playing_status_embed(now: &NowPlaying) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", now.title))
        .color(colors::SUCCESS_GREEN)
        .field(
            "⏱️ Posición",
            format!(
                "`{} / {}`",
                seconds_to_hms(now.elapsed_secs),
                display_length(now.total_secs)
            ),
            true,
        )
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de error
pub fn create_error_embed(message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(message.to_string())
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
}

/// Crea un embed informativo genérico
pub fn create_info_embed(title: &str, message: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(title.to_string())
        .description(message.to_string())
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
}

/// Crea un embed con la letra encontrada (o el aviso de que no hay)
pub fn create_lyrics_embed(query: &str, result: &LyricsResult) -> CreateEmbed {
    match result {
        LyricsResult::Found { text, source_url } => {
            // Discord corta las descripciones en 4096
            let mut body = text.clone();
            if body.len() > 4000 {
                let mut cut = 4000;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
                body.push_str("\n…");
            }

            CreateEmbed::default()
                .title(format!("📜 Letra: {}", query))
                .description(body)
                .url(source_url.clone())
                .color(colors::MUSIC_PURPLE)
                .timestamp(Timestamp::now())
                .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        }
        LyricsResult::NotFound => CreateEmbed::default()
            .title("📜 Letra")
            .description(format!("😔 No se encontró letra para **{}**", query))
            .color(colors::NEUTRAL_GRAY)
            .timestamp(Timestamp::now()),
    }
}

/// Crea el embed de ayuda con la tabla de comandos
pub fn create_help_embed(prefix: &str) -> CreateEmbed {
    let p = prefix;
    CreateEmbed::default()
        .title("📖 Comandos")
        .color(colors::INFO_BLUE)
        .field(
            "🎵 Reproducción",
            format!(
                "`{p}play <url|búsqueda>` (`{p}p`) — reproduce o encola\n\
                 `{p}skip [n]` (`{p}s`) — salta la actual (y n-1 siguientes)\n\
                 `{p}pause` (`{p}pa`) / `{p}resume` (`{p}re`)\n\
                 `{p}seek <hh:mm:ss>` (`{p}se`) — salta a una posición\n\
                 `{p}volume <0-200>` (`{p}v`) — ganancia en porcentaje\n\
                 `{p}loop` (`{p}lo`) — repite la canción actual\n\
                 `{p}nowplaying` (`{p}np`) — posición actual"
            ),
            false,
        )
        .field(
            "📋 Cola",
            format!(
                "`{p}queue [página|last]` (`{p}q`) — lista la cola\n\
                 `{p}shuffle` (`{p}sh`) — baraja\n\
                 `{p}remove <n|last>` (`{p}r`) — quita una canción\n\
                 `{p}move <de> <a>` (`{p}m`) — reordena\n\
                 `{p}clear` (`{p}c`) — vacía la cola"
            ),
            false,
        )
        .field(
            "⚙️ Otros",
            format!(
                "`{p}lyrics [título]` (`{p}ly`) — letra de la canción\n\
                 `{p}prefix <nuevo>` (`{p}pr`) — cambia el prefijo\n\
                 `{p}mixsize <n>` (`{p}ms`) — canciones por mix\n\
                 `{p}leavedelay <min>` (`{p}ld`) — minutos antes de salir\n\
                 `{p}leave` (`{p}l`, `{p}die`) — desconecta el bot"
            ),
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}
