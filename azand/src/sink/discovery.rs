//! SSDP discovery of Sonos speakers
//!
//! Multicasts an M-SEARCH for ZonePlayer devices and reads each responder's
//! room name from its device description. Only used when no speaker address
//! is configured.

use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::SinkError;
use super::sonos::extract_tag;

const SSDP_ADDR: &str = "239.255.255.250:1900";

const SEARCH: &str = "M-SEARCH * HTTP/1.1\r\n\
HOST: 239.255.255.250:1900\r\n\
MAN: \"ssdp:discover\"\r\n\
MX: 2\r\n\
ST: urn:schemas-upnp-org:device:ZonePlayer:1\r\n\r\n";

/// Find a speaker's address on the local network.
///
/// With a room name, returns the speaker whose device description matches it;
/// without one, returns the first responder. Fails with
/// [`SinkError::NotFound`] when nothing answers (or nothing matches).
pub async fn discover(name: Option<&str>, wait: Duration) -> Result<String, SinkError> {
    info!(room = ?name, "Discovering Sonos speakers");

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.send_to(SEARCH.as_bytes(), SSDP_ADDR).await?;

    let candidates = collect_responders(&socket, wait).await?;
    if candidates.is_empty() {
        return Err(SinkError::NotFound("no Sonos speakers on the network".to_string()));
    }
    debug!(count = candidates.len(), "SSDP responders");

    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;

    let mut fallback = None;
    for address in &candidates {
        let url = format!("http://{}:1400/xml/device_description.xml", address);
        let room = match client.get(&url).send().await {
            Ok(response) => match response.text().await {
                Ok(body) => extract_tag(&body, "roomName"),
                Err(e) => {
                    warn!(%address, error = %e, "Unreadable device description");
                    None
                }
            },
            Err(e) => {
                warn!(%address, error = %e, "Unreachable responder");
                continue;
            }
        };

        match (name, room) {
            (Some(wanted), Some(room)) if room == wanted => {
                info!(%address, %room, "Matched speaker by room name");
                return Ok(address.to_string());
            }
            (None, _) => return Ok(address.to_string()),
            _ => {
                fallback.get_or_insert_with(|| address.to_string());
            }
        }
    }

    // No room-name match: take the first reachable speaker instead
    match fallback {
        Some(address) => {
            warn!(room = ?name, %address, "No room name match, using first speaker");
            Ok(address)
        }
        None => Err(SinkError::NotFound("no reachable Sonos speaker".to_string())),
    }
}

/// Gather distinct responder addresses until the deadline passes.
async fn collect_responders(socket: &UdpSocket, wait: Duration) -> Result<Vec<IpAddr>, SinkError> {
    let mut seen = HashSet::new();
    let mut addresses = Vec::new();
    let mut buf = [0u8; 1024];
    let deadline = tokio::time::Instant::now() + wait;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }

        match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok((_, peer))) => {
                if seen.insert(peer.ip()) {
                    addresses.push(peer.ip());
                }
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => break, // deadline
        }
    }

    Ok(addresses)
}
