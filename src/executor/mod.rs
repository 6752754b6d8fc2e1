//! Running the package tools.
//!
//! Everything that spawns a process goes through [`CommandRunner`]. The
//! system implementation lives in [`SystemRunner`]; [`ScriptedRunner`]
//! replays captured output for tests.
pub mod apt;
pub mod dpkg;
pub mod download;
pub mod patterns;
mod replay;
mod system;

pub use replay::ScriptedRunner;
pub use system::SystemRunner;

use crate::error::{Error, Result};

use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run through `sudo -n` when the runner is not root
    pub elevate: bool,
    /// Set `DEBIAN_FRONTEND=noninteractive`
    pub noninteractive: bool,
    /// Overrides the runner's default timeout
    pub timeout: Option<Duration>,
}

/// One external tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Invocation {
    pub tool: String,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub options: RunOptions,
}

impl Invocation {
    pub fn new(tool: &str) -> Self {
        Invocation {
            tool: tool.to_owned(),
            args: Vec::new(),
            stdin: None,
            options: RunOptions::default(),
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, data: Vec<u8>) -> Self {
        self.stdin = Some(data);
        self
    }

    pub fn elevate(mut self) -> Self {
        self.options.elevate = true;
        self
    }

    pub fn noninteractive(mut self) -> Self {
        self.options.noninteractive = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    /// The command as a user would type it, without elevation.
    pub fn command_line(&self) -> String {
        let mut res = self.tool.clone();
        for arg in &self.args {
            res.push(' ');
            res.push_str(arg);
        }
        res
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl Outcome {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a failed exit into [`Error::NonZeroExit`].
    pub fn check(self, tool: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::NonZeroExit {
                tool: tool.to_owned(),
                code: self.code,
                stdout: self.stdout,
                stderr: self.stderr,
            })
        }
    }
}

/// Executes package tool invocations.
///
/// Implementations return `Ok` only for a zero exit status. A non-zero exit
/// is reported as [`Error::NonZeroExit`] carrying both output streams, a
/// process that could not be started as [`Error::ExecutionFailed`] and an
/// expired deadline as [`Error::Timeout`].
pub trait CommandRunner {
    fn run(&self, invocation: &Invocation) -> Result<Outcome>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, invocation: &Invocation) -> Result<Outcome> {
        (**self).run(invocation)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn command_line() {
        let inv = Invocation::new("apt-get")
            .args(["-y", "install"])
            .arg("nginx=1.18.0-0ubuntu1")
            .elevate()
            .noninteractive();
        assert_eq!(
            inv.command_line(),
            "apt-get -y install nginx=1.18.0-0ubuntu1"
        );
        assert!(inv.options.elevate);
        assert!(inv.options.noninteractive);
        assert_eq!(inv.options.timeout, None);
    }

    #[test]
    fn check_outcome() {
        let ok = Outcome {
            code: Some(0),
            stdout: "done".to_owned(),
            stderr: String::new(),
        };
        assert_eq!(ok.clone().check("true").unwrap(), ok);

        let source = vec![Some(1), Some(100), None];
        for code in source {
            let failed = Outcome {
                code,
                stdout: String::new(),
                stderr: "E: oops".to_owned(),
            };
            match failed.check("apt-get") {
                Err(Error::NonZeroExit {
                    tool,
                    code: c,
                    stderr,
                    ..
                }) => {
                    assert_eq!(tool, "apt-get");
                    assert_eq!(c, code);
                    assert_eq!(stderr, "E: oops");
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }
}
