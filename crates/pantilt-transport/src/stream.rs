use std::io::{Read, Write};
use std::net::TcpStream;
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use crate::error::Result;
use crate::pipe::ChildPipe;

/// Zero-cost readiness check for a byte stream.
///
/// `poll_readable(Duration::ZERO)` must return immediately. A `true` result
/// means the next `read` will not block: data is buffered, or the peer has
/// closed and the read will return 0.
pub trait Readiness {
    fn poll_readable(&self, timeout: Duration) -> std::io::Result<bool>;

    /// `true` when the next `write` will accept at least one byte (or fail
    /// immediately because the peer is gone).
    fn poll_writable(&self, timeout: Duration) -> std::io::Result<bool>;
}

/// A connected duplex byte stream implementing `Read + Write`.
///
/// The sensor link, local sockets and the detection worker's stdio pipes all
/// share this type so that framing is implemented once.
pub struct DuplexStream {
    inner: DuplexInner,
}

enum DuplexInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
    Child(Box<ChildPipe>),
    Stdio {
        stdin: std::io::Stdin,
        stdout: std::io::Stdout,
    },
}

impl Read for DuplexStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DuplexInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            DuplexInner::Unix(stream) => stream.read(buf),
            DuplexInner::Child(pipe) => pipe.read(buf),
            DuplexInner::Stdio { stdin, .. } => stdin.read(buf),
        }
    }
}

impl Write for DuplexStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DuplexInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            DuplexInner::Unix(stream) => stream.write(buf),
            DuplexInner::Child(pipe) => pipe.write(buf),
            DuplexInner::Stdio { stdout, .. } => stdout.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DuplexInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            DuplexInner::Unix(stream) => stream.flush(),
            DuplexInner::Child(pipe) => pipe.flush(),
            DuplexInner::Stdio { stdout, .. } => stdout.flush(),
        }
    }
}

impl DuplexStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: DuplexInner::Tcp(stream),
        }
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: UnixStream) -> Self {
        Self {
            inner: DuplexInner::Unix(stream),
        }
    }

    /// Wrap a spawned child process's stdio pipes.
    pub fn from_child(pipe: ChildPipe) -> Self {
        Self {
            inner: DuplexInner::Child(Box::new(pipe)),
        }
    }

    /// This process's own stdin/stdout, as seen by a parent that spawned it.
    pub fn stdio() -> Self {
        Self {
            inner: DuplexInner::Stdio {
                stdin: std::io::stdin(),
                stdout: std::io::stdout(),
            },
        }
    }

    /// A connected pair of Unix sockets, mostly for tests and in-process wiring.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Switch reads and writes into (or out of) non-blocking mode.
    ///
    /// In non-blocking mode a read with no data and a write into a full send
    /// buffer return `ErrorKind::WouldBlock` instead of suspending.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match &self.inner {
            DuplexInner::Tcp(stream) => stream.set_nonblocking(nonblocking)?,
            #[cfg(unix)]
            DuplexInner::Unix(stream) => stream.set_nonblocking(nonblocking)?,
            DuplexInner::Child(pipe) => pipe.set_nonblocking(nonblocking)?,
            #[cfg(unix)]
            DuplexInner::Stdio { stdin, stdout } => {
                set_fd_nonblocking(stdin.as_raw_fd(), nonblocking)?;
                set_fd_nonblocking(stdout.as_raw_fd(), nonblocking)?;
            }
            #[cfg(not(unix))]
            DuplexInner::Stdio { .. } => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Unsupported,
                    "non-blocking stdio requires unix",
                )
                .into())
            }
        }
        Ok(())
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            DuplexInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            DuplexInner::Unix(_) => "unix-domain-socket",
            DuplexInner::Child(_) => "child-stdio",
            DuplexInner::Stdio { .. } => "stdio",
        }
    }

    /// Human-readable peer description (address, or child program).
    pub fn peer_label(&self) -> String {
        match &self.inner {
            DuplexInner::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| addr.to_string())
                .unwrap_or_else(|_| "tcp:unknown".to_string()),
            #[cfg(unix)]
            DuplexInner::Unix(_) => "unix".to_string(),
            DuplexInner::Child(pipe) => format!("{} (pid {})", pipe.program(), pipe.id()),
            DuplexInner::Stdio { .. } => "parent".to_string(),
        }
    }

    #[cfg(unix)]
    fn read_fd(&self) -> RawFd {
        match &self.inner {
            DuplexInner::Tcp(stream) => stream.as_raw_fd(),
            DuplexInner::Unix(stream) => stream.as_raw_fd(),
            DuplexInner::Child(pipe) => pipe.read_fd(),
            DuplexInner::Stdio { stdin, .. } => stdin.as_raw_fd(),
        }
    }

    #[cfg(unix)]
    fn write_fd(&self) -> RawFd {
        match &self.inner {
            DuplexInner::Tcp(stream) => stream.as_raw_fd(),
            DuplexInner::Unix(stream) => stream.as_raw_fd(),
            DuplexInner::Child(pipe) => pipe.write_fd(),
            DuplexInner::Stdio { stdout, .. } => stdout.as_raw_fd(),
        }
    }
}

impl Readiness for DuplexStream {
    #[cfg(unix)]
    fn poll_readable(&self, timeout: Duration) -> std::io::Result<bool> {
        poll_fd(self.read_fd(), libc::POLLIN, timeout)
    }

    #[cfg(unix)]
    fn poll_writable(&self, timeout: Duration) -> std::io::Result<bool> {
        poll_fd(self.write_fd(), libc::POLLOUT, timeout)
    }

    #[cfg(not(unix))]
    fn poll_readable(&self, _timeout: Duration) -> std::io::Result<bool> {
        // Without poll(2) a non-blocking read doubles as the readiness check.
        Ok(true)
    }

    #[cfg(not(unix))]
    fn poll_writable(&self, _timeout: Duration) -> std::io::Result<bool> {
        Ok(true)
    }
}

impl std::fmt::Debug for DuplexStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexStream")
            .field("type", &self.transport_name())
            .finish()
    }
}

/// `poll(2)` a single descriptor for `events` (`POLLIN` or `POLLOUT`).
///
/// Hang-up and error conditions count as ready: the following `read` or
/// `write` returns immediately with EOF or the error.
#[cfg(unix)]
pub(crate) fn poll_fd(
    fd: RawFd,
    events: libc::c_short,
    timeout: Duration,
) -> std::io::Result<bool> {
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

    loop {
        // SAFETY: `pfd` is a valid, exclusively borrowed pollfd and nfds is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        if rc == 0 {
            return Ok(false);
        }
        return Ok(pfd.revents & (events | libc::POLLHUP | libc::POLLERR) != 0);
    }
}

#[cfg(unix)]
pub(crate) fn set_fd_nonblocking(fd: RawFd, nonblocking: bool) -> std::io::Result<()> {
    // SAFETY: fcntl with F_GETFL/F_SETFL only reads and updates status flags of
    // an open descriptor owned by this process.
    unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            return Err(std::io::Error::last_os_error());
        }
        let updated = if nonblocking {
            flags | libc::O_NONBLOCK
        } else {
            flags & !libc::O_NONBLOCK
        };
        if updated != flags && libc::fcntl(fd, libc::F_SETFL, updated) < 0 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}
