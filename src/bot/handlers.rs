//! Implementación de cada comando: validación de argumentos, operación
//! sobre la sesión y respuesta con embed.

use anyhow::{Context as _, Result};
use serenity::all::{ChannelId, Context, Message};
use serenity::builder::{CreateEmbed, CreateMessage};
use std::sync::Arc;

use super::commands::{Command, ParsedCommand};
use super::MixcordBot;
use crate::session::GuildSession;
use crate::sources::Resolved;
use crate::storage::GuildSettings;
use crate::ui::embeds;
use crate::utils::{hms_to_seconds, seconds_to_hms, string_to_index};

pub async fn dispatch(
    bot: &MixcordBot,
    ctx: &Context,
    msg: &Message,
    parsed: ParsedCommand,
    settings: &GuildSettings,
) -> Result<()> {
    let args = &parsed.args;

    match parsed.command {
        Command::Play => play(bot, ctx, msg, args, settings).await,
        Command::Skip => skip(bot, ctx, msg, args).await,
        Command::Queue => queue(bot, ctx, msg, args).await,
        Command::Shuffle => shuffle(bot, ctx, msg).await,
        Command::Remove => remove(bot, ctx, msg, args).await,
        Command::Move => move_track(bot, ctx, msg, args).await,
        Command::Clear => clear(bot, ctx, msg).await,
        Command::Pause => pause(bot, ctx, msg).await,
        Command::Resume => resume(bot, ctx, msg).await,
        Command::Seek => seek(bot, ctx, msg, args).await,
        Command::Volume => volume(bot, ctx, msg, args).await,
        Command::Loop => toggle_loop(bot, ctx, msg).await,
        Command::NowPlaying => now_playing(bot, ctx, msg).await,
        Command::Lyrics => lyrics(bot, ctx, msg, args).await,
        Command::Leave => leave(bot, msg).await,
        Command::Prefix => set_prefix(bot, ctx, msg, args).await,
        Command::MixSize => set_mix_size(bot, ctx, msg, args).await,
        Command::LeaveDelay => set_leave_delay(bot, ctx, msg, args).await,
        Command::Help => reply(ctx, msg, embeds::create_help_embed(&settings.prefix)).await,
    }
}

async fn reply(ctx: &Context, msg: &Message, embed: CreateEmbed) -> Result<()> {
    msg.channel_id
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await?;
    Ok(())
}

/// Canal de voz del autor del mensaje, si está en alguno.
fn author_voice_channel(ctx: &Context, msg: &Message) -> Option<ChannelId> {
    let guild = ctx.cache.guild(msg.guild_id?)?;
    guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|vs| vs.channel_id)
}

/// Sesión existente del guild; con `create`, conecta una nueva al canal de
/// voz del autor.
async fn session_for(
    bot: &MixcordBot,
    ctx: &Context,
    msg: &Message,
    create: bool,
) -> Result<Arc<GuildSession>> {
    let guild_id = msg.guild_id.context("este comando solo funciona en servidores")?;

    if let Some(session) = bot.registry.get(guild_id) {
        return Ok(session);
    }
    if !create {
        anyhow::bail!("el bot no está conectado a ningún canal de voz");
    }

    let voice_channel =
        author_voice_channel(ctx, msg).context("entra a un canal de voz primero")?;
    let manager = songbird::get(ctx)
        .await
        .context("el cliente de voz no está inicializado")?;

    let session = GuildSession::connect(
        manager,
        ctx.http.clone(),
        bot.registry.clone(),
        guild_id,
        voice_channel,
        msg.channel_id,
        bot.config.default_volume,
    )
    .await?;

    bot.registry.insert(session.clone());
    Ok(session)
}

async fn play(
    bot: &MixcordBot,
    ctx: &Context,
    msg: &Message,
    args: &[String],
    settings: &GuildSettings,
) -> Result<()> {
    anyhow::ensure!(!args.is_empty(), "dime qué quieres reproducir");

    let session = session_for(bot, ctx, msg, true).await?;
    let query = args.join(" ");

    match bot.resolver.resolve(&query, settings.mix_items).await? {
        Resolved::Single(track) => {
            let position = session.engine.queue_len() + 1;
            let embed = embeds::create_track_added_embed(&track, position);
            session.engine.enqueue(track).await;
            reply(ctx, msg, embed).await
        }
        Resolved::Many { tracks, origin } => {
            let embed = embeds::create_tracks_added_embed(tracks.len(), &origin);
            session.engine.enqueue_all(tracks).await;
            reply(ctx, msg, embed).await
        }
    }
}

async fn skip(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    let count = args.first().and_then(|a| a.parse::<usize>().ok());

    let outcome = session.engine.skip(count).await?;
    let detail = if outcome.extra_dropped > 0 {
        format!(
            "**{}** y las {} siguientes",
            outcome.skipped_title, outcome.extra_dropped
        )
    } else {
        format!("**{}**", outcome.skipped_title)
    };

    reply(ctx, msg, embeds::create_info_embed("⏭️ Saltada", &detail)).await
}

async fn queue(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;

    let page = session.engine.queue_page(args.first().map(String::as_str));
    let now = session.engine.now_playing().await;
    let embed = embeds::create_queue_embed(page.as_ref(), now.as_ref());

    // El listado reemplaza al anterior en vez de acumularse
    session.notifier.show_queue(embed).await;
    Ok(())
}

async fn shuffle(bot: &MixcordBot, ctx: &Context, msg: &Message) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    anyhow::ensure!(session.engine.queue_len() > 1, "no hay suficientes canciones en la cola");

    session.engine.shuffle_queue();
    reply(ctx, msg, embeds::create_info_embed("🔀 Cola barajada", "El orden es nuevo")).await
}

async fn remove(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    let arg = args.first().context("¿qué posición quito? (número o `last`)")?;

    let index = string_to_index(arg, session.engine.queue_len())
        .context("esa posición no existe en la cola")?;
    let removed = session.engine.remove_track(index)?;

    reply(
        ctx,
        msg,
        embeds::create_info_embed("🗑️ Quitada", &format!("**{}**", removed.title)),
    )
    .await
}

async fn move_track(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    anyhow::ensure!(args.len() == 2, "uso: move <desde> <hasta> (números o `last`)");

    let len = session.engine.queue_len();
    let from = string_to_index(&args[0], len).context("la posición de origen no existe")?;
    let to = string_to_index(&args[1], len).context("la posición de destino no existe")?;

    let title = session.engine.move_track(from, to)?;
    reply(
        ctx,
        msg,
        embeds::create_info_embed(
            "📍 Movida",
            &format!("**{}** ahora es la número {}", title, to + 1),
        ),
    )
    .await
}

async fn clear(bot: &MixcordBot, ctx: &Context, msg: &Message) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    session.engine.clear_queue();
    reply(ctx, msg, embeds::create_info_embed("🗑️ Cola vaciada", "La canción actual sigue sonando")).await
}

async fn pause(bot: &MixcordBot, ctx: &Context, msg: &Message) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    anyhow::ensure!(session.engine.pause().await, "no hay nada en reproducción");
    reply(ctx, msg, embeds::create_info_embed("⏸️ Pausado", "Usa `resume` para seguir")).await
}

async fn resume(bot: &MixcordBot, ctx: &Context, msg: &Message) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    anyhow::ensure!(session.engine.resume().await, "no hay nada en reproducción");
    reply(ctx, msg, embeds::create_info_embed("▶️ Reanudado", "Seguimos")).await
}

async fn seek(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    let arg = args.first().context("uso: seek <hh:mm:ss | segundos>")?;

    let landed = session.engine.seek(hms_to_seconds(arg)).await?;
    reply(
        ctx,
        msg,
        embeds::create_info_embed("⏩ Posición", &format!("Saltado a `{}`", seconds_to_hms(landed))),
    )
    .await
}

async fn volume(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    let percent: u32 = args
        .first()
        .and_then(|a| a.parse().ok())
        .context("uso: volume <0-200>")?;
    anyhow::ensure!(percent <= 200, "el volumen máximo es 200%");

    session.engine.set_volume(percent as f32 / 100.0).await?;
    reply(
        ctx,
        msg,
        embeds::create_info_embed("🔊 Volumen", &format!("Ganancia al {}%", percent)),
    )
    .await
}

async fn toggle_loop(bot: &MixcordBot, ctx: &Context, msg: &Message) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    let looping = session.engine.toggle_loop();

    let text = if looping {
        "🔂 La canción actual se repetirá"
    } else {
        "➡️ Loop desactivado"
    };
    reply(ctx, msg, embeds::create_info_embed("Loop", text)).await
}

async fn now_playing(bot: &MixcordBot, ctx: &Context, msg: &Message) -> Result<()> {
    let session = session_for(bot, ctx, msg, false).await?;
    let now = session
        .engine
        .now_playing()
        .await
        .context("no hay nada en reproducción")?;

    reply(ctx, msg, embeds::create_now_playing_status_embed(&now)).await
}

async fn lyrics(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let query = if args.is_empty() {
        let session = session_for(bot, ctx, msg, false).await?;
        session
            .engine
            .now_playing()
            .await
            .context("no hay nada sonando; dime el título")?
            .title
    } else {
        args.join(" ")
    };

    let result = bot.lyrics.find(&query).await;
    reply(ctx, msg, embeds::create_lyrics_embed(&query, &result)).await
}

async fn leave(bot: &MixcordBot, msg: &Message) -> Result<()> {
    let guild_id = msg.guild_id.context("este comando solo funciona en servidores")?;
    let session = bot
        .registry
        .get(guild_id)
        .context("el bot no está conectado a ningún canal de voz")?;

    // La despedida la publica la propia sesión al desmontarse
    session.shutdown();
    Ok(())
}

async fn set_prefix(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let guild_id = msg.guild_id.context("solo en servidores")?;
    let prefix = args.first().context("uso: prefix <nuevo prefijo>")?;
    anyhow::ensure!(
        !prefix.is_empty() && prefix.len() <= 5,
        "el prefijo debe tener entre 1 y 5 caracteres"
    );

    bot.storage.set_prefix(guild_id.get(), prefix.clone()).await?;
    reply(
        ctx,
        msg,
        embeds::create_info_embed("⚙️ Prefijo", &format!("Ahora es `{}`", prefix)),
    )
    .await
}

async fn set_mix_size(bot: &MixcordBot, ctx: &Context, msg: &Message, args: &[String]) -> Result<()> {
    let guild_id = msg.guild_id.context("solo en servidores")?;
    let size: usize = args
        .first()
        .and_then(|a| a.parse().ok())
        .context("uso: mixsize <1-100>")?;
    anyhow::ensure!((1..=100).contains(&size), "el tamaño de mix va de 1 a 100");

    bot.storage.set_mix_items(guild_id.get(), size).await?;
    reply(
        ctx,
        msg,
        embeds::create_info_embed("⚙️ Mix", &format!("Los mixes traerán {} canciones", size)),
    )
    .await
}

async fn set_leave_delay(
    bot: &MixcordBot,
    ctx: &Context,
    msg: &Message,
    args: &[String],
) -> Result<()> {
    let guild_id = msg.guild_id.context("solo en servidores")?;
    let minutes: u64 = args
        .first()
        .and_then(|a| a.parse().ok())
        .context("uso: leavedelay <minutos>")?;
    anyhow::ensure!((1..=120).contains(&minutes), "entre 1 y 120 minutos");

    bot.storage.set_leave_delay(guild_id.get(), minutes * 60).await?;
    reply(
        ctx,
        msg,
        embeds::create_info_embed(
            "⚙️ Salida",
            &format!("Saldré tras {} minutos con el canal vacío", minutes),
        ),
    )
    .await
}
