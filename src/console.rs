//! Terminal front end
//!
//! Lines typed on stdin become turns; a few slash commands control
//! listening. Replies and problems are printed back.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use crate::history::{LogEntry, Sender};
use crate::satellite::Notice;

/// Something the user asked for at the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Submit typed text as a turn
    Say(String),
    /// Flip continuous listening
    ToggleListening,
    /// Set continuous listening explicitly
    Listen(bool),
    /// Leave the satellite
    Quit,
}

/// Parse one input line; blank lines yield nothing
#[must_use]
pub fn parse_command(line: &str) -> Option<UserCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let Some(rest) = line.strip_prefix('/') else {
        return Some(UserCommand::Say(line.to_string()));
    };

    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("listen"), None) => Some(UserCommand::ToggleListening),
        (Some("listen"), Some("on")) => Some(UserCommand::Listen(true)),
        (Some("listen"), Some("off")) => Some(UserCommand::Listen(false)),
        (Some("quit" | "exit"), _) => Some(UserCommand::Quit),
        // Unknown commands are sent as text
        _ => Some(UserCommand::Say(line.to_string())),
    }
}

/// Read stdin lines into commands until EOF
#[must_use]
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<UserCommand> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(cmd) = parse_command(&line)
                        && tx.send(cmd).is_err()
                    {
                        break;
                    }
                }
                Ok(None) => {
                    tracing::debug!("stdin closed");
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stdin");
                    break;
                }
            }
        }
    });

    rx
}

/// Format a log entry for the terminal
#[must_use]
pub fn render_entry(entry: &LogEntry) -> String {
    match entry.sender {
        Sender::User => format!("you> {}", entry.message),
        Sender::Ai => format!("ai>  {}", entry.message),
    }
}

/// Format a runtime notice for the terminal; state changes are not printed
#[must_use]
pub fn render_notice(notice: &Notice) -> Option<String> {
    match notice {
        Notice::Log(entry) => Some(render_entry(entry)),
        Notice::Report(report) => Some(format!("!    {report}")),
        Notice::State(_) => None,
    }
}

/// Print notices until the runtime goes away
pub fn spawn_notice_printer(mut notices: mpsc::UnboundedReceiver<Notice>) {
    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            if let Notice::State(state) = &notice {
                tracing::debug!(%state, "satellite state");
            }
            if let Some(line) = render_notice(&notice) {
                println!("{line}");
            }
        }
    });
}
