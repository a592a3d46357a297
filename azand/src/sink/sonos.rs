//! Sonos adapter: plain UPnP SOAP over HTTP
//!
//! Five fixed actions against the speaker's MediaRenderer services, each a
//! single POST to port 1400. No session, no subscription, no state held
//! beyond the endpoint.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::SpeakerConfig;

use super::PlaybackSink;
use super::discovery;
use super::error::SinkError;

/// UPnP control port on every Sonos device
const DEVICE_PORT: u16 = 1400;

/// HTTP timeout per SOAP call
const SOAP_TIMEOUT: Duration = Duration::from_secs(10);

/// How long discovery listens for speakers
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// The two device services the adapter drives
#[derive(Debug, Clone, Copy)]
enum Service {
    AvTransport,
    RenderingControl,
}

impl Service {
    fn control_path(&self) -> &'static str {
        match self {
            Service::AvTransport => "/MediaRenderer/AVTransport/Control",
            Service::RenderingControl => "/MediaRenderer/RenderingControl/Control",
        }
    }

    fn urn(&self) -> &'static str {
        match self {
            Service::AvTransport => "urn:schemas-upnp-org:service:AVTransport:1",
            Service::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl:1",
        }
    }
}

/// A connected Sonos speaker
#[derive(Debug, Clone)]
pub struct SonosSink {
    endpoint: String,
    room: String,
    client: reqwest::Client,
}

impl SonosSink {
    /// Connect to the configured speaker.
    ///
    /// Uses the configured address when present, otherwise discovers by room
    /// name (or takes the first speaker found when no name is set either).
    /// Reads the device description to verify the speaker is reachable.
    pub async fn connect(config: &SpeakerConfig) -> Result<Self, SinkError> {
        let address = match &config.address {
            Some(address) => {
                info!(%address, "Connecting to Sonos");
                address.clone()
            }
            None => discovery::discover(config.name.as_deref(), DISCOVERY_TIMEOUT).await?,
        };

        let client = reqwest::Client::builder().timeout(SOAP_TIMEOUT).build()?;
        let endpoint = format!("http://{}:{}", address, DEVICE_PORT);

        let room = fetch_room_name(&client, &endpoint).await?;
        info!(%room, %address, "Connected to Sonos");

        Ok(Self { endpoint, room, client })
    }

    async fn soap(&self, service: Service, action: &str, args: &str) -> Result<(), SinkError> {
        let url = format!("{}{}", self.endpoint, service.control_path());
        let body = envelope(service.urn(), action, args);

        debug!(action, url = %url, "SOAP call");

        let response = self
            .client
            .post(&url)
            .header("SOAPACTION", format!("\"{}#{}\"", service.urn(), action))
            .header("Content-Type", "text/xml; charset=\"utf-8\"")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Soap {
                action: action.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PlaybackSink for SonosSink {
    fn name(&self) -> &str {
        &self.room
    }

    async fn set_volume(&self, volume: u8) -> Result<(), SinkError> {
        let args = format!("<Channel>Master</Channel><DesiredVolume>{}</DesiredVolume>", volume);
        self.soap(Service::RenderingControl, "SetVolume", &args).await
    }

    async fn clear_queue(&self) -> Result<(), SinkError> {
        self.soap(Service::AvTransport, "RemoveAllTracksFromQueue", "").await
    }

    async fn set_transport_uri(&self, track: &str, metadata: &str) -> Result<(), SinkError> {
        let uri = media_uri(track)?;
        let args = format!(
            "<CurrentURI>{}</CurrentURI><CurrentURIMetaData>{}</CurrentURIMetaData>",
            xml_escape(&uri),
            xml_escape(metadata)
        );
        self.soap(Service::AvTransport, "SetAVTransportURI", &args).await
    }

    async fn play(&self) -> Result<(), SinkError> {
        self.soap(Service::AvTransport, "Play", "<Speed>1</Speed>").await
    }

    async fn stop(&self) -> Result<(), SinkError> {
        self.soap(Service::AvTransport, "Stop", "").await
    }
}

/// Read the room name from the device description, verifying reachability.
async fn fetch_room_name(client: &reqwest::Client, endpoint: &str) -> Result<String, SinkError> {
    let url = format!("{}/xml/device_description.xml", endpoint);
    let body = client.get(&url).send().await?.text().await?;

    extract_tag(&body, "roomName")
        .ok_or_else(|| SinkError::InvalidResponse("device description has no roomName".to_string()))
}

/// Map a configured track reference to a device URI.
///
/// `spotify:track:<id>` becomes the Sonos Spotify form (sid=9 is Spotify's
/// service id on Sonos). Anything else is rejected per job, not fatally.
fn media_uri(track: &str) -> Result<String, SinkError> {
    match track.strip_prefix("spotify:track:") {
        Some(id) if !id.is_empty() => Ok(format!(
            "x-sonos-spotify:spotify%3atrack%3a{}?sid=9&flags=8224",
            id
        )),
        _ => Err(SinkError::UnsupportedTrack(track.to_string())),
    }
}

/// Wrap a SOAP action in the standard envelope
fn envelope(urn: &str, action: &str, args: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:{action} xmlns:u=\"{urn}\">\
         <InstanceID>0</InstanceID>{args}\
         </u:{action}></s:Body></s:Envelope>"
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Pull the text of a single XML element out of a device description.
///
/// The descriptions are machine-generated and flat; substring extraction is
/// enough here and keeps an XML parser out of the dependency tree.
pub(super) fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = xml.find(&open)? + open.len();
    let end = xml[start..].find(&close)? + start;
    Some(xml[start..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_uri_spotify_track() {
        let uri = media_uri("spotify:track:4ZtL8BGcP8EdEBm8r1mwUy").unwrap();
        assert_eq!(
            uri,
            "x-sonos-spotify:spotify%3atrack%3a4ZtL8BGcP8EdEBm8r1mwUy?sid=9&flags=8224"
        );
    }

    #[test]
    fn test_media_uri_rejects_other_schemes() {
        assert!(matches!(
            media_uri("file:///azan.mp3"),
            Err(SinkError::UnsupportedTrack(_))
        ));
        assert!(matches!(
            media_uri("spotify:track:"),
            Err(SinkError::UnsupportedTrack(_))
        ));
    }

    #[test]
    fn test_envelope_wraps_action_and_instance() {
        let body = envelope(Service::AvTransport.urn(), "Play", "<Speed>1</Speed>");
        assert!(body.contains(r#"<u:Play xmlns:u="urn:schemas-upnp-org:service:AVTransport:1">"#));
        assert!(body.contains("<InstanceID>0</InstanceID><Speed>1</Speed>"));
        assert!(body.contains("</u:Play>"));
    }

    #[test]
    fn test_xml_escape_covers_uri_query() {
        // The media URI carries a bare & that must not leak into the envelope
        assert_eq!(xml_escape("a?sid=9&flags=8224"), "a?sid=9&amp;flags=8224");
        assert_eq!(xml_escape(r#"<"x">"#), "&lt;&quot;x&quot;&gt;");
    }

    #[test]
    fn test_extract_tag() {
        let xml = "<root><device><roomName>Living Room</roomName></device></root>";
        assert_eq!(extract_tag(xml, "roomName").as_deref(), Some("Living Room"));
        assert_eq!(extract_tag(xml, "friendlyName"), None);
    }

    #[test]
    fn test_service_paths() {
        assert_eq!(
            Service::RenderingControl.control_path(),
            "/MediaRenderer/RenderingControl/Control"
        );
        assert!(Service::AvTransport.urn().ends_with("AVTransport:1"));
    }
}
