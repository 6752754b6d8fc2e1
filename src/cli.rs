//! Console output shared by the library and the front-end.
//!
//! Everything goes to stderr so stdout stays clean for tables and anything
//! a calling script wants to capture.
use console::{measure_text_width, style, Term};
use lazy_static::lazy_static;
use std::sync::atomic::{AtomicBool, Ordering};

const PREFIX_LEN: usize = 10;

static VERBOSE: AtomicBool = AtomicBool::new(false);

lazy_static! {
    pub static ref WRITER: Writer = Writer::new();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Success,
    Warn,
    Error,
    DueTo,
}

pub struct Writer {
    term: Term,
}

impl Writer {
    pub fn new() -> Self {
        Writer {
            term: Term::stderr(),
        }
    }

    pub fn writeln(&self, prefix: &str, msg: &str) -> std::io::Result<()> {
        // Continuation lines line up with the message column
        let mut lines = msg.lines();
        let first = lines.next().unwrap_or("");
        self.term
            .write_line(&format!("{}{}", gen_prefix(prefix), first))?;
        for line in lines {
            self.term.write_line(&format!("{}{}", gen_prefix(""), line))?;
        }
        Ok(())
    }
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

/// Right-align `prefix` into the fixed-width prefix column.
pub fn gen_prefix(prefix: &str) -> String {
    let width = measure_text_width(prefix);
    let padding = PREFIX_LEN.saturating_sub(width + 1);
    format!("{}{} ", " ".repeat(padding), prefix)
}

pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

pub fn log(level: Level, msg: &str) {
    let prefix = match level {
        Level::Debug => {
            if !is_verbose() {
                return;
            }
            style("DEBUG").dim().to_string()
        }
        Level::Info => style("INFO").blue().bold().to_string(),
        Level::Success => style("SUCCESS").green().bold().to_string(),
        Level::Warn => style("WARNING").yellow().bold().to_string(),
        Level::Error => style("ERROR").red().bold().to_string(),
        Level::DueTo => style("DUE TO").yellow().bold().to_string(),
    };
    // Nowhere left to report a failing stderr
    let _ = WRITER.writeln(&prefix, msg);
}

#[macro_export]
macro_rules! debug {
    ($($arg:tt)+) => {
        $crate::cli::log($crate::cli::Level::Debug, &format!($($arg)+))
    };
}

#[macro_export]
macro_rules! info {
    ($($arg:tt)+) => {
        $crate::cli::log($crate::cli::Level::Info, &format!($($arg)+))
    };
}

#[macro_export]
macro_rules! success {
    ($($arg:tt)+) => {
        $crate::cli::log($crate::cli::Level::Success, &format!($($arg)+))
    };
}

#[macro_export]
macro_rules! warn {
    ($($arg:tt)+) => {
        $crate::cli::log($crate::cli::Level::Warn, &format!($($arg)+))
    };
}

#[macro_export]
macro_rules! error {
    ($($arg:tt)+) => {
        $crate::cli::log($crate::cli::Level::Error, &format!($($arg)+))
    };
}

#[macro_export]
macro_rules! due_to {
    ($($arg:tt)+) => {
        $crate::cli::log($crate::cli::Level::DueTo, &format!($($arg)+))
    };
}
