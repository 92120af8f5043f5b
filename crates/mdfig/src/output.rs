//! Terminal reporting for `mdfig`.
//!
//! Everything is written to stderr, so stdout stays free for piping.

use console::{Style, Term};

/// How a line is styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tone {
    Plain,
    Detail,
    Good,
    Warn,
    Bad,
    Heading,
}

impl Tone {
    fn style(self) -> Style {
        match self {
            Self::Plain => Style::new(),
            Self::Detail => Style::new().dim(),
            Self::Good => Style::new().green(),
            Self::Warn => Style::new().yellow(),
            Self::Bad => Style::new().red(),
            Self::Heading => Style::new().cyan().bold(),
        }
    }
}

/// Styled line writer for render reports.
pub(crate) struct Output {
    term: Term,
}

impl Output {
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }

    fn emit(&self, tone: Tone, msg: &str) {
        let _ = self.term.write_line(&tone.style().apply_to(msg).to_string());
    }

    pub(crate) fn info(&self, msg: &str) {
        self.emit(Tone::Plain, msg);
    }

    /// Secondary line, indented under the one before it.
    pub(crate) fn detail(&self, msg: &str) {
        self.emit(Tone::Detail, &format!("  {msg}"));
    }

    /// Document summary: green when every diagram rendered, yellow otherwise.
    pub(crate) fn outcome(&self, msg: &str, failed: usize) {
        let tone = if failed == 0 { Tone::Good } else { Tone::Warn };
        self.emit(tone, msg);
    }

    pub(crate) fn warning(&self, msg: &str) {
        self.emit(Tone::Warn, msg);
    }

    pub(crate) fn error(&self, msg: &str) {
        self.emit(Tone::Bad, msg);
    }

    pub(crate) fn highlight(&self, msg: &str) {
        self.emit(Tone::Heading, msg);
    }
}
