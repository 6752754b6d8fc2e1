use super::{CommandRunner, Invocation, Outcome};
use crate::{
    config::Config,
    error::{Error, Result},
};

use nix::{
    sys::signal::{killpg, Signal},
    unistd::{Pid, Uid},
};
use std::{
    io::{Read, Write},
    os::unix::process::CommandExt,
    process::{Child, Command, Stdio},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
/// Time a timed out process group gets between SIGTERM and SIGKILL
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Runs invocations as real processes on this host.
#[derive(Clone, Debug)]
pub struct SystemRunner {
    sudo: bool,
    default_timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(config: &Config) -> Self {
        SystemRunner {
            sudo: config.sudo && !Uid::effective().is_root(),
            default_timeout: config.timeout(),
        }
    }

    fn build(&self, inv: &Invocation) -> Command {
        // Tool output is parsed, keep it in the C locale
        let mut env = vec![("LC_ALL", "C")];
        if inv.options.noninteractive {
            env.push(("DEBIAN_FRONTEND", "noninteractive"));
        }

        let mut cmd = if inv.options.elevate && self.sudo {
            // sudo resets the environment, pass it through env(1)
            let mut cmd = Command::new("sudo");
            cmd.args(["-n", "env"]);
            cmd.args(env.iter().map(|(k, v)| format!("{}={}", k, v)));
            cmd.arg(&inv.tool);
            cmd
        } else {
            let mut cmd = Command::new(&inv.tool);
            cmd.envs(env);
            cmd
        };
        // Own process group, so a timeout reaches everything sudo started
        cmd.process_group(0);
        cmd.args(&inv.args)
            .stdin(if inv.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(&Config::default())
    }
}

fn drain<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut stream) = stream {
            // A read error only truncates the captured text
            let _ = stream.read_to_end(&mut buf);
        }
        buf
    })
}

fn collect(handle: JoinHandle<Vec<u8>>) -> String {
    let buf = handle.join().unwrap_or_default();
    String::from_utf8_lossy(&buf).into_owned()
}

/// `None` when the deadline passed before the child exited
fn wait_until(
    child: &mut Child,
    deadline: Option<Instant>,
) -> std::io::Result<Option<Option<i32>>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status.code()));
        }
        match deadline {
            Some(deadline) if Instant::now() >= deadline => return Ok(None),
            _ => thread::sleep(POLL_INTERVAL),
        }
    }
}

/// Stop the child's whole process group. sudo relays SIGTERM to the
/// elevated command but cannot relay SIGKILL.
fn terminate(child: &mut Child) {
    let group = Pid::from_raw(child.id() as i32);
    if let Err(e) = killpg(group, Signal::SIGTERM) {
        debug!("Failed to signal process group {}: {}", group, e);
    }
    let deadline = Instant::now() + KILL_GRACE;
    if let Ok(Some(_)) = wait_until(child, Some(deadline)) {
        // The leader is gone, stragglers in its group still get killed
        let _ = killpg(group, Signal::SIGKILL);
        return;
    }
    debug!("Process group {} ignored SIGTERM, killing it", group);
    let _ = killpg(group, Signal::SIGKILL);
    let _ = child.kill();
    let _ = child.wait();
}

impl CommandRunner for SystemRunner {
    fn run(&self, inv: &Invocation) -> Result<Outcome> {
        debug!("Running {}", inv.command_line());
        let exec_failed = |source| Error::ExecutionFailed {
            tool: inv.tool.clone(),
            source,
        };

        let mut child = self.build(inv).spawn().map_err(exec_failed)?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        if let (Some(data), Some(mut pipe)) = (&inv.stdin, child.stdin.take()) {
            let data = data.clone();
            // Dropping the pipe afterwards closes the child's stdin
            thread::spawn(move || pipe.write_all(&data));
        }

        let timeout = inv.options.timeout.or(self.default_timeout);
        let deadline = timeout.map(|t| Instant::now() + t);
        let code = match wait_until(&mut child, deadline).map_err(exec_failed)? {
            Some(code) => code,
            None => {
                terminate(&mut child);
                return Err(Error::Timeout {
                    tool: inv.tool.clone(),
                    after: timeout.unwrap_or_default(),
                });
            }
        };

        let outcome = Outcome {
            code,
            stdout: collect(stdout),
            stderr: collect(stderr),
        };
        if !outcome.success() {
            debug!(
                "{} exited with {:?}: {}",
                inv.tool,
                outcome.code,
                outcome.stderr.trim()
            );
        }
        outcome.check(&inv.tool)
    }
}
