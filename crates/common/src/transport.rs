//! Address encoding between listen addresses and HTTP connection strings.
//!
//! Nodes listen on `host:port` only. Socket paths are still recognised so
//! they can be refused early, and so a socket-form HTTP host (each `/`
//! replaced by `-.-`, as in `tmp-.-sqlcluster-.-node0-.-node0.sock`) can be
//! rewritten when redirecting a client to another node.

use thiserror::Error;

/// Separator standing in for `/` inside a socket-form host.
pub const SEPARATOR: &str = "-.-";

/// Suffix every socket path ends with.
pub const SOCKET_SUFFIX: &str = ".sock";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("empty address")]
    Empty,
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("socket path addresses are not supported: {0}")]
    SocketPath(String),
}

/// True when `addr` names a socket path rather than `host:port`.
pub fn is_socket_path(addr: &str) -> bool {
    addr.contains('/') || addr.ends_with(SOCKET_SUFFIX)
}

/// Split a `host:port` address, validating the port.
pub fn split_host_port(addr: &str) -> Result<(&str, u16), TransportError> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))?;
    if host.is_empty() {
        return Err(TransportError::InvalidAddress(addr.to_string()));
    }
    let port = port
        .parse::<u16>()
        .map_err(|_| TransportError::InvalidAddress(addr.to_string()))?;
    Ok((host, port))
}

/// Encode a `host:port` listen address into the connection string peers dial.
pub fn encode(listen: &str) -> Result<String, TransportError> {
    let listen = listen.trim();
    if listen.is_empty() {
        return Err(TransportError::Empty);
    }
    if is_socket_path(listen) {
        return Err(TransportError::SocketPath(listen.to_string()));
    }

    split_host_port(listen)?;
    Ok(format!("http://{listen}"))
}

/// Substitute `name` into both places of a `<prefix><x>-.-<x>.sock` host.
///
/// Returns `None` when `host` does not have that shape.
pub fn substitute_node(host: &str, name: &str) -> Option<String> {
    let stem = host.strip_suffix(SOCKET_SUFFIX)?;
    let mut parts = stem.rsplitn(3, SEPARATOR);
    let file = parts.next()?;
    let dir = parts.next()?;
    if file.is_empty() || dir.is_empty() {
        return None;
    }

    let prefix_len = stem.len() - file.len() - SEPARATOR.len() - dir.len();
    Some(format!(
        "{}{name}{SEPARATOR}{name}{SOCKET_SUFFIX}",
        &host[..prefix_len]
    ))
}

/// The `host[:port]` part of a connection string.
pub fn authority(connection_string: &str) -> &str {
    let rest = connection_string
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(connection_string);
    rest.split('/').next().unwrap_or(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_tcp_address() {
        assert_eq!(encode("127.0.0.1:4001").unwrap(), "http://127.0.0.1:4001");
        assert_eq!(encode(" localhost:80 ").unwrap(), "http://localhost:80");
    }

    #[test]
    fn encode_rejects_bad_addresses() {
        assert_eq!(encode(""), Err(TransportError::Empty));
        assert!(encode("localhost").is_err());
        assert!(encode("localhost:http").is_err());
        assert!(encode(":4000").is_err());
    }

    #[test]
    fn encode_refuses_socket_paths() {
        assert_eq!(
            encode("/tmp/sqlcluster/node0/node0.sock"),
            Err(TransportError::SocketPath("/tmp/sqlcluster/node0/node0.sock".into()))
        );
        assert!(matches!(encode("node0.sock"), Err(TransportError::SocketPath(_))));
    }

    #[test]
    fn substitute_node_rewrites_both_places() {
        let host = "tmp-.-sqlcluster-.-node0-.-node0.sock";
        assert_eq!(
            substitute_node(host, "node3").as_deref(),
            Some("tmp-.-sqlcluster-.-node3-.-node3.sock")
        );
        assert_eq!(
            substitute_node("node0-.-node0.sock", "node1").as_deref(),
            Some("node1-.-node1.sock")
        );
    }

    #[test]
    fn substitute_node_ignores_tcp_hosts() {
        assert_eq!(substitute_node("127.0.0.1:4001", "node1"), None);
        assert_eq!(substitute_node("node0.sock", "node1"), None);
    }

    #[test]
    fn authority_strips_scheme_and_path() {
        assert_eq!(authority("http://127.0.0.1:4001"), "127.0.0.1:4001");
        assert_eq!(authority("http://127.0.0.1:4001/sql"), "127.0.0.1:4001");
        assert_eq!(authority("10.0.0.2:80"), "10.0.0.2:80");
    }
}
