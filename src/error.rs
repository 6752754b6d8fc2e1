use crate::executor::patterns;

use std::{fmt, path::PathBuf, time::Duration};
use thiserror::Error;

/// Raw tool output kept in errors is cut down to this many bytes
const SNIPPET_LEN: usize = 512;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed version {input:?}: {reason}")]
    MalformedVersion { input: String, reason: String },
    #[error("Unexpected output from {tool}: {reason}\n{snippet}")]
    MalformedOutput {
        tool: String,
        reason: String,
        snippet: String,
    },
    #[error("Malformed repository definition{}: {reason}\n{line}", location(.file, .line_no))]
    MalformedRepository {
        line: String,
        reason: String,
        file: Option<PathBuf>,
        line_no: Option<usize>,
    },
    #[error("Package {name} not found in the package catalog")]
    PackageNotFound { name: String },
    #[error("Version {version} of package {name} is not offered by any configured repository")]
    VersionNotFound { name: String, version: String },
    #[error("Package {name} should be {expected} but is {observed} after the operation")]
    StateMismatch {
        name: String,
        expected: String,
        observed: String,
    },
    #[error("Failed to execute {tool}")]
    ExecutionFailed {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{tool} exited with {}\n{}", exit_status(.code), snippet(.stderr))]
    NonZeroExit {
        tool: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
    #[error("{tool} did not finish within {}s and was terminated", .after.as_secs())]
    Timeout { tool: String, after: Duration },
    #[error("Failed to import signing key {key}: {reason}")]
    KeyImportFailed { key: String, reason: String },
    #[error("Failed to access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid configuration {}: {reason}", .path.display())]
    Config { path: PathBuf, reason: String },
}

impl Error {
    /// Whether the tool failed because another process holds the package lock.
    pub fn is_lock_held(&self) -> bool {
        match self {
            Error::NonZeroExit { stderr, .. } => patterns::lock_held(stderr),
            _ => false,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed_output(tool: &str, reason: impl fmt::Display, output: &str) -> Self {
        Error::MalformedOutput {
            tool: tool.to_owned(),
            reason: reason.to_string(),
            snippet: snippet(output),
        }
    }

    pub(crate) fn malformed_repo(line: &str, reason: impl fmt::Display) -> Self {
        Error::MalformedRepository {
            line: line.trim_end().to_owned(),
            reason: reason.to_string(),
            file: None,
            line_no: None,
        }
    }

    /// Attach the source file position to a repository parsing error.
    pub(crate) fn at(self, path: &std::path::Path, at_line: usize) -> Self {
        self.at_line(at_line).in_file(path)
    }

    pub(crate) fn at_line(self, at_line: usize) -> Self {
        match self {
            Error::MalformedRepository {
                line, reason, file, ..
            } => Error::MalformedRepository {
                line,
                reason,
                file,
                line_no: Some(at_line),
            },
            other => other,
        }
    }

    /// Keeps a line number set earlier.
    pub(crate) fn in_file(self, path: &std::path::Path) -> Self {
        match self {
            Error::MalformedRepository {
                line,
                reason,
                line_no,
                ..
            } => Error::MalformedRepository {
                line,
                reason,
                file: Some(path.to_owned()),
                line_no,
            },
            other => other,
        }
    }
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("return code {}", code),
        None => "a signal".to_owned(),
    }
}

fn location(file: &Option<PathBuf>, line_no: &Option<usize>) -> String {
    match (file, line_no) {
        (Some(file), Some(n)) => format!(" at {}:{}", file.display(), n),
        (Some(file), None) => format!(" in {}", file.display()),
        _ => String::new(),
    }
}

pub(crate) fn snippet(output: &str) -> String {
    let output = output.trim();
    if output.len() <= SNIPPET_LEN {
        return output.to_owned();
    }
    let mut end = SNIPPET_LEN;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &output[..end])
}
