//! TCP transport primitives for the socket pump.

use std::io::{self, ErrorKind};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};

use crate::config::{AddressFamily, SocketLogConfig};

fn family_accepts(family: AddressFamily, addr: &SocketAddr) -> bool {
    match family {
        AddressFamily::Unspecified => true,
        AddressFamily::Inet => addr.is_ipv4(),
        AddressFamily::Inet6 => addr.is_ipv6(),
    }
}

/// Resolve the configured endpoint, keeping only the configured family.
pub fn resolve(config: &SocketLogConfig) -> io::Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = (config.host.as_str(), config.port)
        .to_socket_addrs()?
        .filter(|addr| family_accepts(config.address_family, addr))
        .collect();
    if addrs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::AddrNotAvailable,
            format!(
                "{}:{} has no {:?} address",
                config.host, config.port, config.address_family
            ),
        ));
    }
    Ok(addrs)
}

/// Connect to the first reachable address of the endpoint.
///
/// The stream is left blocking, with reads timing out after the poll interval
/// so one thread can alternate between draining and receiving.
pub fn connect(config: &SocketLogConfig) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in resolve(config)? {
        match TcpStream::connect_timeout(&addr, config.connect_timeout) {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(config.poll_interval))?;
                stream.set_write_timeout(Some(config.connect_timeout))?;
                return Ok(stream);
            }
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            ErrorKind::NotConnected,
            format!("unable to connect to {}:{}", config.host, config.port),
        )
    }))
}

/// Rewrites `\r\n` to `\r`, remembering a trailing `\r` across chunks.
#[derive(Debug, Default)]
pub struct LineEndingFix {
    after_cr: bool,
}

impl LineEndingFix {
    /// Append the rewritten form of `chunk` to `out`.
    pub fn apply(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.reserve(chunk.len());
        for &byte in chunk {
            if self.after_cr && byte == b'\n' {
                self.after_cr = false;
                continue;
            }
            self.after_cr = byte == b'\r';
            out.push(byte);
        }
    }
}
