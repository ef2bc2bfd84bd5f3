//! Listening socket setup and the accept seam used by the reactor.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;

/// Something the reactor can accept connections from.
///
/// `accept_one` is called once per listener readiness signal and must not
/// block: with nothing pending it returns `WouldBlock`. Returned streams are
/// non-blocking.
pub trait Acceptor: AsRawFd {
    type Stream: Read + Write + AsRawFd;

    fn accept_one(&mut self) -> io::Result<(Self::Stream, String)>;
}

impl Acceptor for TcpListener {
    type Stream = TcpStream;

    fn accept_one(&mut self) -> io::Result<(TcpStream, String)> {
        let (stream, peer) = self.accept()?;
        stream.set_nonblocking(true)?;
        stream.set_nodelay(true)?;
        Ok((stream, peer.to_string()))
    }
}

/// Resolve `listen` to a socket address.
pub fn parse_addr(listen: &str) -> io::Result<SocketAddr> {
    listen
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, format!("{listen}: {e}")))
}

/// Create a non-blocking TCP listener with SO_REUSEADDR.
pub fn bind(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_ephemeral_port() {
        let listener = bind(parse_addr("127.0.0.1:0").unwrap(), 16).unwrap();
        assert_ne!(listener.local_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_parse_addr_rejects_garbage() {
        let err = parse_addr("not-an-address").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_accept_one_would_block_when_idle() {
        let mut listener = bind(parse_addr("127.0.0.1:0").unwrap(), 16).unwrap();
        let err = listener.accept_one().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_accept_one_returns_nonblocking_stream() {
        let mut listener = bind(parse_addr("127.0.0.1:0").unwrap(), 16).unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).unwrap();

        let (mut stream, peer) = loop {
            match listener.accept_one() {
                Ok(accepted) => break accepted,
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) => panic!("accept failed: {e}"),
            }
        };
        assert!(peer.starts_with("127.0.0.1:"));

        let mut buf = [0u8; 4];
        let err = stream.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
