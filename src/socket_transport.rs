use std::io;
use async_trait::async_trait;
use tokio::net::TcpStream;

/// This is the abstraction of a connected byte stream that a [crate::socket::Socket] drives.
///
/// It follows tokio's readiness model: `readable()` / `writable()` wait until the stream is
///  (probably) ready, and the `try_` functions perform a single non-blocking call, returning
///  `WouldBlock` if the readiness turned out to be spurious. `try_read` returning `Ok(0)` means
///  the peer closed its sending side.
#[async_trait]
pub trait SocketTransport: Send + Sync + 'static {
    async fn readable(&self) -> io::Result<()>;

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize>;

    async fn writable(&self) -> io::Result<()>;

    fn try_write(&self, buf: &[u8]) -> io::Result<usize>;

    /// for logging
    fn peer_description(&self) -> String;
}

#[async_trait]
impl SocketTransport for TcpStream {
    async fn readable(&self) -> io::Result<()> {
        TcpStream::readable(self).await
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::try_read(self, buf)
    }

    async fn writable(&self) -> io::Result<()> {
        TcpStream::writable(self).await
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        TcpStream::try_write(self, buf)
    }

    fn peer_description(&self) -> String {
        match self.peer_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => "<unknown peer>".to_string(),
        }
    }
}

#[cfg(unix)]
#[async_trait]
impl SocketTransport for tokio::net::UnixStream {
    async fn readable(&self) -> io::Result<()> {
        tokio::net::UnixStream::readable(self).await
    }

    fn try_read(&self, buf: &mut [u8]) -> io::Result<usize> {
        tokio::net::UnixStream::try_read(self, buf)
    }

    async fn writable(&self) -> io::Result<()> {
        tokio::net::UnixStream::writable(self).await
    }

    fn try_write(&self, buf: &[u8]) -> io::Result<usize> {
        tokio::net::UnixStream::try_write(self, buf)
    }

    fn peer_description(&self) -> String {
        match self.peer_addr() {
            Ok(addr) => format!("{:?}", addr),
            Err(_) => "<unknown peer>".to_string(),
        }
    }
}
