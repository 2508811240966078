use std::{
    io::{self, Read, Write},
    thread,
    time::{Duration, Instant},
};

#[cfg(not(feature = "log-to-stdout"))]
use log::{debug, trace, warn};

#[cfg(feature = "log-to-stdout")]
use crate::{debug, trace, warn};

/// Connected byte channel to the host. Implemented by the platform socket types.
/// Implement it for custom transports to pass them into [DuplexStream::from_transport]
pub trait Transport: Read + Write + Send {
    /// Close both directions. Must tolerate a peer which has already gone
    fn shutdown(&mut self) -> io::Result<()>;
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn shutdown(&mut self) -> io::Result<()> {
        match std::os::unix::net::UnixStream::shutdown(&*self, std::net::Shutdown::Both) {
            Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
            _ => Ok(()),
        }
    }
}

/// Client end of a named pipe. Pipe handles opened without overlapped IO are
/// regular blocking files
#[cfg(windows)]
impl Transport for std::fs::File {
    fn shutdown(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connection attempt parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Total time to wait for the endpoint to appear
    pub timeout: Duration,
    /// Pause between connection attempts
    pub retry_interval: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retry_interval: Duration::from_millis(50),
        }
    }
}

/// Bidirectional byte stream to the host.
/// Reads are exact, writes are complete and flushed. Closing is idempotent
pub struct DuplexStream {
    endpoint: String,
    inner: Option<Box<dyn Transport>>,
}

impl DuplexStream {
    /// Connect to a host `endpoint`: a named pipe path (`\\.\pipe\<name>`) on Windows,
    /// a Unix socket path elsewhere.
    /// Retries while the endpoint is not available yet. Returns [crate::Error::ConnectTimeout]
    /// if it doesn't become available within `options.timeout`
    pub fn open(endpoint: &str, options: &ConnectOptions) -> crate::Result<Self> {
        let deadline = Instant::now() + options.timeout;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match connect_platform(endpoint) {
                Ok(transport) => {
                    debug!("Connected to `{endpoint}` after {attempt} attempt(s)");
                    return Ok(Self::from_boxed(endpoint, transport));
                }
                Err(e) if is_not_available(&e) => {
                    trace!("Endpoint `{endpoint}` is not available yet: {e}");
                }
                Err(e) => {
                    warn!("Failed to connect to `{endpoint}`: {e}");
                    return Err(crate::Error::Io(e.to_string()));
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("Giving up connecting to `{endpoint}` after {attempt} attempt(s)");
                return Err(crate::Error::ConnectTimeout);
            }

            thread::sleep(options.retry_interval.min(deadline - now));
        }
    }

    /// Wrap an already connected transport. `label` is only used for logging
    pub fn from_transport<T: Transport + 'static>(label: &str, transport: T) -> Self {
        Self::from_boxed(label, Box::new(transport))
    }

    fn from_boxed(endpoint: &str, transport: Box<dyn Transport>) -> Self {
        Self {
            endpoint: endpoint.to_owned(),
            inner: Some(transport),
        }
    }

    /// Endpoint or label the stream was created with
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    /// Read exactly `n` bytes. Returns [crate::Error::ConnectionClosed] if the peer closes earlier
    pub fn read_bytes(&mut self, n: usize) -> crate::Result<Vec<u8>> {
        let mut buffer = vec![0u8; n];
        self.read_exact(&mut buffer)?;

        Ok(buffer)
    }

    /// Write and flush all of `bytes`
    pub fn write_bytes(&mut self, bytes: &[u8]) -> crate::Result<()> {
        self.write_all(bytes)?;
        self.flush()?;

        Ok(())
    }

    /// Close the stream. Safe to call multiple times, and after the peer has closed
    pub fn close(&mut self) {
        if let Some(mut transport) = self.inner.take() {
            debug!("Closing stream to `{}`", self.endpoint);

            if let Err(e) = transport.shutdown() {
                debug!("Stream shutdown error: {e}");
            }
        }
    }

    fn transport(&mut self) -> io::Result<&mut Box<dyn Transport>> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "stream is closed"))
    }
}

impl Read for DuplexStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.transport()?.read(buf)
    }
}

impl Write for DuplexStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.transport()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.transport()?.flush()
    }
}

impl Drop for DuplexStream {
    fn drop(&mut self) {
        self.close()
    }
}

#[cfg(unix)]
fn connect_platform(endpoint: &str) -> io::Result<Box<dyn Transport>> {
    let stream = std::os::unix::net::UnixStream::connect(endpoint)?;
    Ok(Box::new(stream))
}

#[cfg(windows)]
fn connect_platform(endpoint: &str) -> io::Result<Box<dyn Transport>> {
    let pipe = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(endpoint)?;
    Ok(Box::new(pipe))
}

#[cfg(windows)]
const ERROR_PIPE_BUSY: i32 = 231;

fn is_not_available(error: &io::Error) -> bool {
    #[cfg(windows)]
    if error.raw_os_error() == Some(ERROR_PIPE_BUSY) {
        return true;
    }

    matches!(
        error.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused | io::ErrorKind::WouldBlock
    )
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::net::UnixStream;

    use super::*;

    #[test]
    fn test_exact_read() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mut stream = DuplexStream::from_transport("pair", left);

        right.write_all(b"hello world").unwrap();

        assert_eq!(stream.read_bytes(5).unwrap(), b"hello");
        assert_eq!(stream.read_bytes(6).unwrap(), b" world");
    }

    #[test]
    fn test_short_read_is_closed_connection() {
        let (left, mut right) = UnixStream::pair().unwrap();
        let mut stream = DuplexStream::from_transport("pair", left);

        right.write_all(b"abc").unwrap();
        drop(right);

        assert!(matches!(
            stream.read_bytes(10),
            Err(crate::Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (left, right) = UnixStream::pair().unwrap();
        let mut stream = DuplexStream::from_transport("pair", left);

        drop(right);
        stream.close();
        stream.close();

        assert!(stream.is_closed());
        assert!(matches!(
            stream.write_bytes(b"data"),
            Err(crate::Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_connect_timeout() {
        let path = std::env::temp_dir().join(format!("caplink-missing-{}.sock", std::process::id()));
        let options = ConnectOptions {
            timeout: Duration::from_millis(100),
            retry_interval: Duration::from_millis(10),
        };

        let start = Instant::now();
        let result = DuplexStream::open(path.to_str().unwrap(), &options);

        assert!(matches!(result, Err(crate::Error::ConnectTimeout)));
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn test_connect_waits_for_endpoint() {
        use std::os::unix::net::UnixListener;

        let path = std::env::temp_dir().join(format!("caplink-late-{}.sock", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let listener_path = path.clone();
        let listener = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            let listener = UnixListener::bind(&listener_path).unwrap();
            let (mut peer, _) = listener.accept().unwrap();
            peer.write_all(b"ok").unwrap();
        });

        let mut stream = DuplexStream::open(path.to_str().unwrap(), &ConnectOptions::default()).unwrap();
        assert_eq!(stream.read_bytes(2).unwrap(), b"ok");

        listener.join().unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
