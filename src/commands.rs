#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Skip,
    Start,
    Focus(Vec<String>),
    Exclude(Vec<String>),
    Surrender,
    Retry,
    Unknown(String),
}

pub const HELP_TEXT: &str = "Commands: /focus <topics>, /exclude <topics>, /start, /skip, /surrender, /retry, /help, /quit";

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
        "/quit" | "/exit" => SlashCommand::Quit,
        "/skip" => SlashCommand::Skip,
        "/start" => SlashCommand::Start,
        "/focus" => SlashCommand::Focus(topic_list(rest)),
        "/exclude" => SlashCommand::Exclude(topic_list(rest)),
        "/surrender" => SlashCommand::Surrender,
        "/retry" => SlashCommand::Retry,
        _ => SlashCommand::Unknown(command.to_string()),
    };

    Some(parsed)
}

/// Comma-separated topic names; blanks are dropped.
fn topic_list(args: &str) -> Vec<String> {
    args.split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}
