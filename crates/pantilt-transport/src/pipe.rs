use std::io::{Read, Write};
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};

/// A child process driven over its stdin/stdout.
///
/// Writes go to the child's stdin, reads come from its stdout. The child's
/// stderr is inherited so its diagnostics land next to ours. The process is
/// killed and reaped when the pipe is dropped.
pub struct ChildPipe {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    program: String,
}

impl ChildPipe {
    /// Spawn a whitespace-separated command line (no shell expansion).
    pub fn spawn(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts.next().ok_or(TransportError::EmptyCommand)?;
        let mut command = Command::new(program);
        command.args(parts);
        Self::spawn_command(command)
    }

    /// Spawn a prepared command with piped stdin/stdout.
    pub fn spawn_command(mut command: Command) -> Result<Self> {
        let program = command.get_program().to_string_lossy().into_owned();
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = command.spawn().map_err(|source| TransportError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let (stdin, stdout) = match (stdin, stdout) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TransportError::Spawn {
                    program,
                    source: std::io::Error::other("child stdio was not captured"),
                });
            }
        };

        info!(program = %program, pid = child.id(), "spawned child process");

        Ok(Self {
            child,
            stdin,
            stdout,
            program,
        })
    }

    /// OS process id of the child.
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Program name the child was spawned from.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns true once the child has exited.
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    #[cfg(unix)]
    pub(crate) fn read_fd(&self) -> RawFd {
        self.stdout.as_raw_fd()
    }

    #[cfg(unix)]
    pub(crate) fn write_fd(&self) -> RawFd {
        self.stdin.as_raw_fd()
    }

    #[cfg(unix)]
    pub(crate) fn set_nonblocking(&self, nonblocking: bool) -> std::io::Result<()> {
        crate::stream::set_fd_nonblocking(self.stdout.as_raw_fd(), nonblocking)?;
        crate::stream::set_fd_nonblocking(self.stdin.as_raw_fd(), nonblocking)
    }

    #[cfg(not(unix))]
    pub(crate) fn set_nonblocking(&self, _nonblocking: bool) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "non-blocking child pipes require unix",
        ))
    }
}

impl Read for ChildPipe {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Write for ChildPipe {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stdin.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stdin.flush()
    }
}

impl Drop for ChildPipe {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!(program = %self.program, %status, "child already exited");
            }
            Ok(None) => {
                if let Err(err) = self.child.kill() {
                    warn!(program = %self.program, error = %err, "failed to kill child");
                }
                let _ = self.child.wait();
                debug!(program = %self.program, "child terminated");
            }
            Err(err) => {
                warn!(program = %self.program, error = %err, "failed to query child status");
            }
        }
    }
}
