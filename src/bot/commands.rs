//! Tabla de comandos por prefijo.
//!
//! Cada comando tiene un nombre largo y una abreviatura; la tabla vive en
//! un único `lookup` y el resto del bot trabaja solo con el enum.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Play,
    Skip,
    Queue,
    Shuffle,
    Remove,
    Move,
    Clear,
    Pause,
    Resume,
    Seek,
    Volume,
    Loop,
    NowPlaying,
    Lyrics,
    Leave,
    Prefix,
    MixSize,
    LeaveDelay,
    Help,
}

/// Comando reconocido más sus argumentos crudos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: Command,
    pub args: Vec<String>,
}

/// Nombre o abreviatura a comando. Desconocidos devuelven `None` y el
/// mensaje se ignora en silencio.
fn lookup(name: &str) -> Option<Command> {
    let command = match name {
        "p" | "play" => Command::Play,
        "s" | "skip" => Command::Skip,
        "q" | "queue" => Command::Queue,
        "sh" | "shuffle" => Command::Shuffle,
        "r" | "remove" => Command::Remove,
        "m" | "move" => Command::Move,
        "c" | "clear" => Command::Clear,
        "pa" | "pause" => Command::Pause,
        "re" | "resume" => Command::Resume,
        "se" | "seek" => Command::Seek,
        "v" | "volume" => Command::Volume,
        "lo" | "loop" => Command::Loop,
        "np" | "nowplaying" => Command::NowPlaying,
        "ly" | "lyrics" => Command::Lyrics,
        "l" | "leave" | "die" => Command::Leave,
        "pr" | "prefix" => Command::Prefix,
        "ms" | "mixsize" => Command::MixSize,
        "ld" | "leavedelay" => Command::LeaveDelay,
        "h" | "help" => Command::Help,
        _ => return None,
    };
    Some(command)
}

/// Parsea un mensaje: debe empezar por el prefijo del guild y nombrar un
/// comando conocido.
pub fn parse(content: &str, prefix: &str) -> Option<ParsedCommand> {
    let rest = content.strip_prefix(prefix)?;
    let mut words = rest.split_whitespace();

    let command = lookup(&words.next()?.to_lowercase())?;
    let args = words.map(|w| w.to_string()).collect();

    Some(ParsedCommand { command, args })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_long_and_short_names() {
        let long = parse("$play despacito", "$").unwrap();
        let short = parse("$p despacito", "$").unwrap();
        assert_eq!(long.command, Command::Play);
        assert_eq!(short.command, Command::Play);
        assert_eq!(long.args, vec!["despacito"]);
    }

    #[test]
    fn test_parse_respects_guild_prefix() {
        assert!(parse("!skip", "$").is_none());
        assert_eq!(parse("!skip", "!").unwrap().command, Command::Skip);
    }

    #[test]
    fn test_parse_is_case_insensitive_on_the_command() {
        assert_eq!(parse("$PLAY x", "$").unwrap().command, Command::Play);
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        assert!(parse("$frobnicate", "$").is_none());
        assert!(parse("hola sin prefijo", "$").is_none());
    }

    #[test]
    fn test_multi_arg_commands() {
        let parsed = parse("$m 3 last", "$").unwrap();
        assert_eq!(parsed.command, Command::Move);
        assert_eq!(parsed.args, vec!["3", "last"]);
    }

    #[test]
    fn test_die_is_leave() {
        assert_eq!(parse("$die", "$").unwrap().command, Command::Leave);
    }
}
