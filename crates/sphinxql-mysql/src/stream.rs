//! Byte streams to a listener: TCP or a local unix socket.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use sphinxql_core::{ConnectionError, ConnectionErrorKind, Endpoint, Error, Result};

use crate::config::SphinxConfig;

#[derive(Debug)]
pub(crate) enum Stream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

fn connect_error(endpoint: &Endpoint, err: io::Error) -> Error {
    let kind = match err.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => ConnectionErrorKind::Refused,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => ConnectionErrorKind::Timeout,
        _ => ConnectionErrorKind::Connect,
    };
    Error::Connection(ConnectionError {
        kind,
        message: format!("Can't connect to SphinxQL server on '{}': {}", endpoint, err),
        source: Some(Box::new(err)),
    })
}

impl Stream {
    /// Open a stream to `endpoint` and apply the configured socket timeouts.
    pub(crate) fn connect(endpoint: &Endpoint, config: &SphinxConfig) -> Result<Self> {
        let stream = match endpoint {
            Endpoint::Tcp { host, port } => Stream::Tcp(
                Self::connect_tcp(host, *port, config.connect_timeout)
                    .map_err(|e| connect_error(endpoint, e))?,
            ),
            #[cfg(unix)]
            Endpoint::Socket(path) => {
                Stream::Unix(UnixStream::connect(path).map_err(|e| connect_error(endpoint, e))?)
            }
            #[cfg(not(unix))]
            Endpoint::Socket(_) => {
                return Err(Error::Config(sphinxql_core::ConfigError {
                    message: format!("Local sockets are not supported here: {}", endpoint),
                    source: None,
                }));
            }
        };
        // The handshake runs under the connect timeout.
        stream
            .set_timeouts(config.connect_timeout, config.connect_timeout)
            .map_err(|e| connect_error(endpoint, e))?;
        Ok(stream)
    }

    fn connect_tcp(host: &str, port: u16, timeout: Duration) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in (host, port).to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no address for host {}", host))
        }))
    }

    pub(crate) fn set_timeouts(&self, read: Duration, write: Duration) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => {
                s.set_read_timeout(Some(read))?;
                s.set_write_timeout(Some(write))
            }
            #[cfg(unix)]
            Stream::Unix(s) => {
                s.set_read_timeout(Some(read))?;
                s.set_write_timeout(Some(write))
            }
        }
    }

    pub(crate) fn shutdown(&self) {
        let _ = match self {
            Stream::Tcp(s) => s.shutdown(Shutdown::Both),
            #[cfg(unix)]
            Stream::Unix(s) => s.shutdown(Shutdown::Both),
        };
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.read(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Stream::Tcp(s) => s.write(buf),
            #[cfg(unix)]
            Stream::Unix(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Stream::Tcp(s) => s.flush(),
            #[cfg(unix)]
            Stream::Unix(s) => s.flush(),
        }
    }
}
