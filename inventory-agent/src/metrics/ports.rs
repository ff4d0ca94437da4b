//! Local exposure of well-known TCP ports
//!
//! Linux exposes every TCP socket in `/proc/net/tcp{,6}`, which also catches
//! ports bound on non-loopback addresses. Other platforms fall back to a
//! connect probe against `127.0.0.1`.

use inventory_store::{ActivePorts, TRACKED_PORTS};
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinSet;
use tracing::debug;

const PROC_TCP_TABLES: [&str; 2] = ["/proc/net/tcp", "/proc/net/tcp6"];

/// Tracked ports with a local TCP socket
pub async fn collect_active_ports(probe_timeout: Duration) -> ActivePorts {
    let ports = match read_socket_tables() {
        Ok(ports) => ports,
        Err(e) => {
            debug!("Socket tables unavailable ({}), probing localhost", e);
            probe_local_ports(probe_timeout).await
        }
    };

    let active = ActivePorts::from_ports(ports);
    debug!("Active tracked ports: [{}]", active);
    active
}

/// Local ports of every TCP socket listed by the kernel
fn read_socket_tables() -> io::Result<Vec<u16>> {
    let mut ports = Vec::new();
    let mut last_error = None;
    let mut read_any = false;

    for table in PROC_TCP_TABLES {
        match std::fs::read_to_string(table) {
            Ok(content) => {
                read_any = true;
                ports.extend(parse_socket_table(&content));
            }
            Err(e) => last_error = Some(e),
        }
    }

    match (read_any, last_error) {
        (false, Some(e)) => Err(e),
        _ => Ok(ports),
    }
}

/// Parse `/proc/net/tcp` content into local port numbers
///
/// The second column is `ADDR:PORT` with the port in hex.
pub fn parse_socket_table(content: &str) -> Vec<u16> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let local = line.split_whitespace().nth(1)?;
            let (_, port) = local.rsplit_once(':')?;
            u16::from_str_radix(port, 16).ok()
        })
        .collect()
}

async fn probe_local_ports(probe_timeout: Duration) -> Vec<u16> {
    let mut probes = JoinSet::new();
    for port in TRACKED_PORTS {
        probes.spawn(async move {
            let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
            let connected = matches!(
                tokio::time::timeout(probe_timeout, TcpStream::connect(addr)).await,
                Ok(Ok(_))
            );
            connected.then_some(port)
        });
    }

    let mut open = Vec::new();
    while let Some(result) = probes.join_next().await {
        if let Ok(Some(port)) = result {
            open.push(port);
        }
    }
    open
}
