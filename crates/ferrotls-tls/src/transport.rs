//! Byte-transport backend interface.
//!
//! The engine performs no I/O of its own: every byte in or out goes
//! through a caller-supplied [`Transport`]. Methods take `&self` so the
//! read and write halves of a connection can run concurrently.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::{Arc, Condvar, Mutex};

use ferrotls_types::TlsError;

/// A full-duplex, reliable, ordered byte stream.
pub trait Transport: Send + Sync {
    /// Write all of `buf` or fail.
    fn send(&self, buf: &[u8]) -> Result<(), TlsError>;

    /// Block until at least one byte is available; return up to `max`
    /// bytes. An empty result means the peer half-closed.
    fn recv(&self, max: usize) -> Result<Vec<u8>, TlsError>;

    fn flush(&self) -> Result<(), TlsError> {
        Ok(())
    }

    fn close(&self);
}

impl Transport for std::net::TcpStream {
    fn send(&self, buf: &[u8]) -> Result<(), TlsError> {
        (&mut &*self).write_all(buf)?;
        Ok(())
    }

    fn recv(&self, max: usize) -> Result<Vec<u8>, TlsError> {
        let mut buf = vec![0u8; max.min(16 * 1024)];
        let n = (&mut &*self).read(&mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn flush(&self) -> Result<(), TlsError> {
        (&mut &*self).flush()?;
        Ok(())
    }

    fn close(&self) {
        let _ = self.shutdown(std::net::Shutdown::Both);
    }
}

struct PipeState {
    buf: VecDeque<u8>,
    closed: bool,
}

/// One direction of an in-memory duplex stream.
struct Pipe {
    state: Mutex<PipeState>,
    readable: Condvar,
}

impl Pipe {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(PipeState {
                buf: VecDeque::new(),
                closed: false,
            }),
            readable: Condvar::new(),
        })
    }

    fn write(&self, data: &[u8]) -> Result<(), TlsError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TlsError::InternalError("pipe poisoned".into()))?;
        if state.closed {
            return Err(TlsError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "pipe closed",
            )));
        }
        state.buf.extend(data);
        self.readable.notify_all();
        Ok(())
    }

    fn read(&self, max: usize) -> Result<Vec<u8>, TlsError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| TlsError::InternalError("pipe poisoned".into()))?;
        while state.buf.is_empty() && !state.closed {
            state = self
                .readable
                .wait(state)
                .map_err(|_| TlsError::InternalError("pipe poisoned".into()))?;
        }
        let n = state.buf.len().min(max);
        let out: Vec<u8> = state.buf.drain(..n).collect();
        Ok(out)
    }

    fn close(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.closed = true;
            self.readable.notify_all();
        }
    }
}

/// One endpoint of an in-memory duplex connection (see [`duplex`]).
pub struct DuplexTransport {
    tx: Arc<Pipe>,
    rx: Arc<Pipe>,
}

impl Transport for DuplexTransport {
    fn send(&self, buf: &[u8]) -> Result<(), TlsError> {
        self.tx.write(buf)
    }

    fn recv(&self, max: usize) -> Result<Vec<u8>, TlsError> {
        self.rx.read(max)
    }

    /// Half-close: the peer sees EOF after draining, but may keep
    /// sending toward us (mirrors TCP `shutdown(Write)`).
    fn close(&self) {
        self.tx.close();
    }
}

/// An in-memory full-duplex byte stream pair.
pub fn duplex() -> (DuplexTransport, DuplexTransport) {
    let a_to_b = Pipe::new();
    let b_to_a = Pipe::new();
    (
        DuplexTransport {
            tx: a_to_b.clone(),
            rx: b_to_a.clone(),
        },
        DuplexTransport {
            tx: b_to_a,
            rx: a_to_b,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplex_roundtrip() {
        let (a, b) = duplex();
        a.send(b"ping").unwrap();
        assert_eq!(b.recv(1024).unwrap(), b"ping");
        b.send(b"pong").unwrap();
        assert_eq!(a.recv(1024).unwrap(), b"pong");
    }

    #[test]
    fn test_recv_respects_max() {
        let (a, b) = duplex();
        a.send(b"abcdef").unwrap();
        assert_eq!(b.recv(2).unwrap(), b"ab");
        assert_eq!(b.recv(100).unwrap(), b"cdef");
    }

    #[test]
    fn test_close_gives_eof() {
        let (a, b) = duplex();
        a.send(b"last").unwrap();
        a.close();
        assert_eq!(b.recv(10).unwrap(), b"last");
        // Drained and closed: EOF.
        assert!(b.recv(10).unwrap().is_empty());
        // Half-close: b may still send toward a.
        b.send(b"x").unwrap();
        assert_eq!(a.recv(10).unwrap(), b"x");
        // Writing from the closed side fails.
        assert!(a.send(b"y").is_err());
    }

    #[test]
    fn test_blocking_recv_wakes_on_send() {
        let (a, b) = duplex();
        let handle = std::thread::spawn(move || b.recv(16).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(20));
        a.send(b"wake").unwrap();
        assert_eq!(handle.join().unwrap(), b"wake");
    }
}
