use super::{CommandRunner, Invocation, Outcome};
use crate::error::{Error, Result};

use std::{cell::RefCell, io, time::Duration};

#[derive(Clone, Debug)]
enum Reply {
    Exit(Outcome),
    Timeout,
}

#[derive(Debug)]
struct Script {
    command: String,
    reply: Reply,
    used: bool,
}

/// A [`CommandRunner`] replaying captured tool output.
///
/// Replies are keyed by the full command line (see
/// [`Invocation::command_line`]). When one command is scripted several
/// times, the replies are handed out in order and the last one repeats.
/// Every invocation is recorded, scripted or not.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: RefCell<Vec<Script>>,
    calls: RefCell<Vec<Invocation>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, command: &str, reply: Reply) -> Self {
        self.scripts.borrow_mut().push(Script {
            command: command.to_owned(),
            reply,
            used: false,
        });
        self
    }

    /// Reply with exit status 0 and `stdout`.
    pub fn on(self, command: &str, stdout: &str) -> Self {
        self.push(
            command,
            Reply::Exit(Outcome {
                code: Some(0),
                stdout: stdout.to_owned(),
                stderr: String::new(),
            }),
        )
    }

    /// Reply with a failed exit.
    pub fn fail(self, command: &str, code: i32, stderr: &str) -> Self {
        self.push(
            command,
            Reply::Exit(Outcome {
                code: Some(code),
                stdout: String::new(),
                stderr: stderr.to_owned(),
            }),
        )
    }

    /// Reply as if the process exceeded its deadline.
    pub fn timeout(self, command: &str) -> Self {
        self.push(command, Reply::Timeout)
    }

    /// Command lines of every invocation so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    /// Number of recorded invocations starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn next_reply(&self, command: &str) -> Option<Reply> {
        let mut scripts = self.scripts.borrow_mut();
        let matching: Vec<usize> = scripts
            .iter()
            .enumerate()
            .filter(|(_, s)| s.command == command)
            .map(|(i, _)| i)
            .collect();
        let pick = matching
            .iter()
            .copied()
            .find(|i| !scripts[*i].used)
            .or_else(|| matching.last().copied())?;
        scripts[pick].used = true;
        Some(scripts[pick].reply.clone())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, inv: &Invocation) -> Result<Outcome> {
        let command = inv.command_line();
        self.calls.borrow_mut().push(inv.clone());
        match self.next_reply(&command) {
            Some(Reply::Exit(outcome)) => outcome.check(&inv.tool),
            Some(Reply::Timeout) => Err(Error::Timeout {
                tool: inv.tool.clone(),
                after: inv.options.timeout.unwrap_or(Duration::from_secs(0)),
            }),
            None => Err(Error::ExecutionFailed {
                tool: inv.tool.clone(),
                source: io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no scripted reply for `{}`", command),
                ),
            }),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn replies_in_order_then_repeat() {
        let runner = ScriptedRunner::new()
            .on("apt-cache policy nginx", "first")
            .on("apt-cache policy nginx", "second");
        let inv = Invocation::new("apt-cache").args(["policy", "nginx"]);
        let replies: Vec<String> = (0..3)
            .map(|_| runner.run(&inv).unwrap().stdout)
            .collect();
        assert_eq!(replies, vec!["first", "second", "second"]);
        assert_eq!(runner.count("apt-cache policy"), 3);
    }

    #[test]
    fn unscripted_and_failures() {
        let runner = ScriptedRunner::new()
            .fail("apt-get update", 100, "E: Could not get lock")
            .timeout("curl https://example.com");
        assert!(matches!(
            runner.run(&Invocation::new("apt-get").arg("update")),
            Err(Error::NonZeroExit { code: Some(100), .. })
        ));
        assert!(matches!(
            runner.run(&Invocation::new("curl").arg("https://example.com")),
            Err(Error::Timeout { .. })
        ));
        assert!(matches!(
            runner.run(&Invocation::new("dpkg")),
            Err(Error::ExecutionFailed { .. })
        ));
        assert_eq!(
            runner.calls(),
            vec!["apt-get update", "curl https://example.com", "dpkg"]
        );
    }
}
