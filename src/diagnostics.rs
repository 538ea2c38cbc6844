use std::fmt::Display;
use std::io::IsTerminal;

use colored::Colorize;

use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Info,
}

impl Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Error => f.write_str("error"),
            Level::Info => f.write_str("info"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub level: Level,
    pub location: Location,
    pub message: String,
}

/// Accumulator for user-facing messages with fatal-latch semantics: the first
/// error latches failure for the rest of the compilation. Later passes may
/// keep running to surface independent errors, but once the latch is set no
/// output is produced and the process exits non-zero.
#[derive(Default, Debug)]
pub struct Status {
    diagnostics: Vec<Diagnostic>,
    failed: bool,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    /// The status can only get worse; nothing ever resets the latch.
    pub fn ok(&self) -> bool {
        !self.failed
    }

    pub fn error(&mut self, location: Location, message: impl Into<String>) {
        let message = message.into();
        self.diagnostics.push(Diagnostic {
            level: Level::Error,
            location,
            message,
        });
        self.failed = true;

        if std::env::var("STATUS_BREAK").is_ok() {
            self.report();
            std::process::exit(1);
        }
    }

    /// Attach a secondary location to the most recent error, e.g.
    /// "previously declared here".
    pub fn info(&mut self, location: Location, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            level: Level::Info,
            location,
            message: message.into(),
        });
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Write all accumulated diagnostics to stderr, colored when stderr is a
    /// terminal.
    pub fn report(&self) {
        let color = std::io::stderr().is_terminal();
        for diagnostic in &self.diagnostics {
            let level = match (diagnostic.level, color) {
                (Level::Error, true) => "error".red().bold().to_string(),
                (Level::Info, true) => "info".cyan().to_string(),
                (level, false) => level.to_string(),
            };
            eprintln!("{}: {level}: {}", diagnostic.location, diagnostic.message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_latches_on_first_error() {
        let mut status = Status::new();
        assert!(status.ok());

        status.error(Location::builtin(), "something went wrong");
        status.info(Location::builtin(), "previously declared here");

        assert!(!status.ok());
        assert_eq!(2, status.diagnostics().len());
        assert_eq!(Level::Error, status.diagnostics()[0].level);
    }
}
