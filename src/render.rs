//! Output rendering for the chat terminal.
//!
//! The session controller talks to the screen only through [`Renderer`].
//! [`PlainTextRenderer`] is the terminal implementation: it prints new
//! message-log lines above the prompt and numbers friend rows so the REPL can
//! address them.

use std::collections::HashSet;
use std::io::{self, Write};
use std::sync::Mutex;

use rustyline::ExternalPrinter;

use crate::types::{Friend, FriendRequest, Origin, RenderedLine};

/// ANSI escape code for gray text (used for own messages).
const ANSI_GRAY: &str = "\x1b[90m";

/// ANSI escape code for green text (used for peer messages).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for yellow text (used for notifications).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for bold text (used for list headings).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Render instructions issued by the session controller.
///
/// Methods take `&self` because the poll loop publishes from a background
/// task while the REPL holds the controller.
pub trait Renderer: Send + Sync {
    /// Show the message log of the active conversation, oldest first.
    ///
    /// Each call carries the full snapshot; implementations decide how much
    /// of it is new.
    fn render_message_log(&self, lines: &[RenderedLine]);

    /// Forget the displayed log, e.g. because another conversation was
    /// selected.
    fn clear_message_log(&self) {}

    /// Show the friend list.  Row `n` (1-based) is `friends[n - 1]`.
    fn render_friend_list(&self, friends: &[Friend]);

    /// Show the pending friend requests.  Row `n` (1-based) is
    /// `requests[n - 1]`.
    fn render_friend_request_list(&self, requests: &[FriendRequest]);

    /// Show a transient notification.
    fn notify(&self, message: &str);
}

/// Plain text renderer with optional ANSI styling.
///
/// Output goes through a rustyline external printer when one is attached so
/// it lands above the prompt instead of inside the line being edited.
pub struct PlainTextRenderer {
    use_color: bool,
    printer: Mutex<Option<Box<dyn ExternalPrinter + Send>>>,
    shown: Mutex<HashSet<String>>,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            use_color,
            printer: Mutex::new(None),
            shown: Mutex::new(HashSet::new()),
        }
    }

    /// Routes output through `printer`.
    pub fn with_printer(self, printer: Box<dyn ExternalPrinter + Send>) -> Self {
        if let Ok(mut slot) = self.printer.lock() {
            *slot = Some(printer);
        }
        self
    }

    fn emit(&self, text: String) {
        if let Ok(mut printer) = self.printer.lock()
            && let Some(printer) = printer.as_mut()
            && printer.print(text.clone()).is_ok()
        {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = writeln!(stdout, "{text}");
        let _ = stdout.flush();
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_color {
            format!("{color}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    /// Formats a single log line.
    pub fn format_line(&self, line: &RenderedLine) -> String {
        let color = match line.origin {
            Origin::Own => ANSI_GRAY,
            Origin::Peer => ANSI_GREEN,
        };
        self.paint(color, &line.to_string())
    }

    /// Returns the lines of `lines` not yet printed, marking them printed.
    fn unseen<'a>(&self, lines: &'a [RenderedLine]) -> Vec<&'a RenderedLine> {
        let Ok(mut shown) = self.shown.lock() else {
            return lines.iter().collect();
        };
        lines
            .iter()
            .filter(|line| shown.insert(line_key(line)))
            .collect()
    }

    fn format_rows<'a>(
        &self,
        heading: &str,
        empty: &str,
        names: impl Iterator<Item = &'a str>,
    ) -> String {
        let mut out = self.paint(ANSI_BOLD, heading);
        let mut any = false;
        for (idx, name) in names.enumerate() {
            any = true;
            out.push_str(&format!("\n  {}. {}", idx + 1, name));
        }
        if !any {
            out.push_str(&format!("\n  {empty}"));
        }
        out
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PlainTextRenderer {
    fn render_message_log(&self, lines: &[RenderedLine]) {
        let fresh = self.unseen(lines);
        if fresh.is_empty() {
            return;
        }
        let text = fresh
            .into_iter()
            .map(|line| self.format_line(line))
            .collect::<Vec<_>>()
            .join("\n");
        self.emit(text);
    }

    fn clear_message_log(&self) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.clear();
        }
    }

    fn render_friend_list(&self, friends: &[Friend]) {
        let text = self.format_rows(
            "Friends:",
            "(none yet; use /add <email>)",
            friends.iter().map(|f| f.name.as_str()),
        );
        self.emit(text);
    }

    fn render_friend_request_list(&self, requests: &[FriendRequest]) {
        let text = self.format_rows(
            "Friend requests:",
            "(none pending)",
            requests.iter().map(|r| r.name.as_str()),
        );
        self.emit(text);
    }

    fn notify(&self, message: &str) {
        self.emit(self.paint(ANSI_YELLOW, &format!("* {message}")));
    }
}

/// Identity of a line for de-duplication.  Messages without a server id fall
/// back to their timestamp and content.
fn line_key(line: &RenderedLine) -> String {
    if line.message_id.is_empty() {
        format!("{}\u{0}{}", line.timestamp, line.content)
    } else {
        line.message_id.clone()
    }
}
