use std::path::PathBuf;

/// Slash command typed at the prompt. Positions are 1-based indices into
/// the visible chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Edit { position: usize, text: String },
    Regenerate { position: usize },
    Previous { position: usize },
    Next { position: usize },
    Import(PathBuf),
    Export(PathBuf),
    Sync,
    System(Option<String>),
    Models,
    Logs,
    ClearLogs,
    Save(PathBuf),
    Load(PathBuf),
    Cancel,
    Quit,
    /// Known command with missing or malformed arguments.
    Usage(&'static str),
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /help, /edit <n> <text>, /regen <n>, /prev <n>, /next <n>, \
/import <path>, /export <path>, /sync, /system [text], /models, /logs [clear], \
/save <path>, /load <path>, /cancel, /quit";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let (command, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (trimmed, ""),
    };

    let parsed = match command {
        "/help" => SlashCommand::Help,
        "/edit" => {
            let (position, text) = match rest.split_once(char::is_whitespace) {
                Some((position, text)) => (position, text.trim()),
                None => (rest, ""),
            };
            match parse_position(position) {
                Some(position) if !text.is_empty() => SlashCommand::Edit {
                    position,
                    text: text.to_string(),
                },
                _ => SlashCommand::Usage("/edit <n> <text>"),
            }
        }
        "/regen" => parse_position(rest)
            .map(|position| SlashCommand::Regenerate { position })
            .unwrap_or(SlashCommand::Usage("/regen <n>")),
        "/prev" => parse_position(rest)
            .map(|position| SlashCommand::Previous { position })
            .unwrap_or(SlashCommand::Usage("/prev <n>")),
        "/next" => parse_position(rest)
            .map(|position| SlashCommand::Next { position })
            .unwrap_or(SlashCommand::Usage("/next <n>")),
        "/import" => path_arg(rest)
            .map(SlashCommand::Import)
            .unwrap_or(SlashCommand::Usage("/import <path>")),
        "/export" => path_arg(rest)
            .map(SlashCommand::Export)
            .unwrap_or(SlashCommand::Usage("/export <path>")),
        "/save" => path_arg(rest)
            .map(SlashCommand::Save)
            .unwrap_or(SlashCommand::Usage("/save <path>")),
        "/load" => path_arg(rest)
            .map(SlashCommand::Load)
            .unwrap_or(SlashCommand::Usage("/load <path>")),
        "/sync" => SlashCommand::Sync,
        "/system" => SlashCommand::System((!rest.is_empty()).then(|| rest.to_string())),
        "/models" => SlashCommand::Models,
        "/logs" => match rest {
            "" => SlashCommand::Logs,
            "clear" => SlashCommand::ClearLogs,
            _ => SlashCommand::Usage("/logs [clear]"),
        },
        "/cancel" => SlashCommand::Cancel,
        "/quit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

fn parse_position(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|position| *position > 0)
}

fn path_arg(raw: &str) -> Option<PathBuf> {
    (!raw.is_empty()).then(|| PathBuf::from(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_not_a_command() {
        assert_eq!(parse_slash_command("hello there"), None);
        assert_eq!(parse_slash_command("  "), None);
    }

    #[test]
    fn edit_keeps_the_full_replacement_text() {
        assert_eq!(
            parse_slash_command("/edit 3   what about   tabs?"),
            Some(SlashCommand::Edit {
                position: 3,
                text: "what about   tabs?".to_string(),
            })
        );
        assert_eq!(
            parse_slash_command("/edit 3"),
            Some(SlashCommand::Usage("/edit <n> <text>"))
        );
        assert_eq!(
            parse_slash_command("/edit zero text"),
            Some(SlashCommand::Usage("/edit <n> <text>"))
        );
    }

    #[test]
    fn positions_are_one_based() {
        assert_eq!(
            parse_slash_command("/regen 2"),
            Some(SlashCommand::Regenerate { position: 2 })
        );
        assert_eq!(
            parse_slash_command("/prev 0"),
            Some(SlashCommand::Usage("/prev <n>"))
        );
        assert_eq!(
            parse_slash_command("/next 4"),
            Some(SlashCommand::Next { position: 4 })
        );
    }

    #[test]
    fn path_and_optional_arguments() {
        assert_eq!(
            parse_slash_command("/export out dir/chat.html"),
            Some(SlashCommand::Export(PathBuf::from("out dir/chat.html")))
        );
        assert_eq!(
            parse_slash_command("/load"),
            Some(SlashCommand::Usage("/load <path>"))
        );
        assert_eq!(parse_slash_command("/system"), Some(SlashCommand::System(None)));
        assert_eq!(
            parse_slash_command("/system  be terse "),
            Some(SlashCommand::System(Some("be terse".to_string())))
        );
        assert_eq!(parse_slash_command("/logs clear"), Some(SlashCommand::ClearLogs));
        assert_eq!(
            parse_slash_command("/logs everything"),
            Some(SlashCommand::Usage("/logs [clear]"))
        );
    }

    #[test]
    fn unknown_commands_keep_their_name() {
        assert_eq!(
            parse_slash_command("/nope extra args"),
            Some(SlashCommand::Unknown("/nope".to_string()))
        );
    }
}
