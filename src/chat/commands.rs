//! Slash command parsing for the chat terminal.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the session instead of sending a message to the
//! active conversation.

/// A parsed chat command.
///
/// Row arguments are typed 1-based, as the friend lists are numbered, and
/// stored 0-based.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Run the OAuth login flow.
    Login,

    /// Forget the session.
    Logout,

    /// Pause polling and show both friend lists.
    Friends,

    /// Leave the friends view and resume polling.
    Close,

    /// Open the chat with the friend at this row.
    Chat(usize),

    /// Send a friend request to this email address.
    Add(String),

    /// Accept the friend request at this row.
    Accept(usize),

    /// Reject the friend request at this row.
    Reject(usize),

    /// Delete the friend at this row.
    Delete(usize),

    /// Show login, conversation and polling state.
    Status,

    /// Display help information.
    Help,

    /// Exit the chat terminal.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a message.
///
/// # Examples
///
/// ```
/// # use chat_terminal::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
/// assert_eq!(parse_command("/chat 2"), Some(ChatCommand::Chat(1)));
/// assert!(parse_command("see you at 5").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "login" => ChatCommand::Login,
        "logout" => ChatCommand::Logout,
        "friends" => ChatCommand::Friends,
        "close" => ChatCommand::Close,
        "chat" => parse_row_command(argument, ChatCommand::Chat, "/chat"),
        "add" => match argument {
            Some(email) if email.contains('@') => ChatCommand::Add(email.to_string()),
            Some(_) => ChatCommand::Invalid("/add expects an email address".to_string()),
            None => ChatCommand::Invalid("/add requires an email address".to_string()),
        },
        "accept" => parse_row_command(argument, ChatCommand::Accept, "/accept"),
        "reject" => parse_row_command(argument, ChatCommand::Reject, "/reject"),
        "delete" => parse_row_command(argument, ChatCommand::Delete, "/delete"),
        "status" => ChatCommand::Status,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_row_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(usize) -> ChatCommand,
{
    match argument {
        Some(arg) => match arg.parse::<usize>() {
            Ok(row) if row > 0 => constructor(row - 1),
            _ => ChatCommand::Invalid(format!("{} expects a row number from the list", name)),
        },
        None => ChatCommand::Invalid(format!("{} requires a row number", name)),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /login                 Log in through the browser
  /logout                Log out and forget the saved session
  /friends               Show friends and friend requests (pauses updates)
  /close                 Leave the friends view
  /chat <n>              Chat with friend number n
  /add <email>           Send a friend request
  /accept <n>            Accept friend request number n
  /reject <n>            Reject friend request number n
  /delete <n>            Delete friend number n
  /status                Show session status
  /help                  Show this help message
  /quit                  Exit
Anything else is sent to the open chat."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/QUIT"), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_session_commands() {
        assert_eq!(parse_command("/login"), Some(ChatCommand::Login));
        assert_eq!(parse_command("/logout"), Some(ChatCommand::Logout));
        assert_eq!(parse_command("/friends"), Some(ChatCommand::Friends));
        assert_eq!(parse_command(" /close "), Some(ChatCommand::Close));
        assert_eq!(parse_command("/status"), Some(ChatCommand::Status));
        assert_eq!(parse_command("/?"), Some(ChatCommand::Help));
    }

    #[test]
    fn parse_rows_are_one_based() {
        assert_eq!(parse_command("/chat 1"), Some(ChatCommand::Chat(0)));
        assert_eq!(parse_command("/accept 3"), Some(ChatCommand::Accept(2)));
        assert_eq!(parse_command("/reject  2"), Some(ChatCommand::Reject(1)));
        assert_eq!(parse_command("/delete 10"), Some(ChatCommand::Delete(9)));
        assert!(matches!(parse_command("/chat 0"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/chat two"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/delete"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn parse_add() {
        assert_eq!(
            parse_command("/add ada@example.com"),
            Some(ChatCommand::Add("ada@example.com".to_string()))
        );
        assert!(matches!(parse_command("/add ada"), Some(ChatCommand::Invalid(_))));
        assert!(matches!(parse_command("/add"), Some(ChatCommand::Invalid(_))));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse_command("/dance"),
            Some(ChatCommand::Invalid("Unknown command: /dance".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Hello there"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/friends"));
        assert!(help.contains("/accept"));
    }
}
