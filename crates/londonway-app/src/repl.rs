//! REPL command parsing.

use londonway_chat::QuickPrompt;

pub const HELP: &str = "\
Commands:
  /fav <label>   save the last reply as a favorite journey
  /favs          list favorite journeys
  /go <n>        plan favorite number n
  /unfav <n>     remove favorite number n
  /stepfree      Step-free quick prompt
  /fare          Fare Check quick prompt
  /bank          Bank Tips quick prompt
  /help          show this help
  /quit          exit
Anything else is sent as a question.";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Quick(QuickPrompt),
    SaveFavorite(String),
    ListFavorites,
    /// 1-based index into the favorites list.
    PlanFavorite(usize),
    RemoveFavorite(usize),
    Help,
    Quit,
    Empty,
    Invalid(String),
}

pub fn parse(line: &str) -> Command {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Command::Empty;
    }
    let Some(rest) = trimmed.strip_prefix('/') else {
        return Command::Ask(line.trim_end_matches(['\r', '\n']).to_string());
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    match name {
        "fav" if !arg.is_empty() => Command::SaveFavorite(arg.to_string()),
        "fav" => Command::Invalid("usage: /fav <label>".to_string()),
        "favs" => Command::ListFavorites,
        "go" => index_arg(arg).map_or_else(Command::Invalid, Command::PlanFavorite),
        "unfav" => index_arg(arg).map_or_else(Command::Invalid, Command::RemoveFavorite),
        "stepfree" => Command::Quick(QuickPrompt::StepFree),
        "fare" => Command::Quick(QuickPrompt::FareCheck),
        "bank" => Command::Quick(QuickPrompt::BankTips),
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => Command::Invalid(format!("unknown command /{other}; try /help")),
    }
}

fn index_arg(arg: &str) -> Result<usize, String> {
    match arg.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(format!("expected a favorite number, got {arg:?}")),
    }
}
