//! Playback sink: the capability the scheduler needs from a speaker
//!
//! The scheduler core only ever talks to [`PlaybackSink`]; the Sonos SOAP
//! adapter lives behind it so the untestable network/hardware part stays out
//! of the schedulable core.

mod discovery;
mod error;
mod sonos;

use async_trait::async_trait;

pub use discovery::discover;
pub use error::SinkError;
pub use sonos::SonosSink;

/// A connected audio device the azan plays on.
///
/// `set_transport_uri` takes the configured track reference
/// (`scheme:identifier`); mapping it to a device URI is the adapter's
/// business, never the caller's.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Human-readable device name (room name for Sonos)
    fn name(&self) -> &str;

    /// Set playback volume (0-100)
    async fn set_volume(&self, volume: u8) -> Result<(), SinkError>;

    /// Remove anything queued on the device
    async fn clear_queue(&self) -> Result<(), SinkError>;

    /// Point the transport at a track
    async fn set_transport_uri(&self, track: &str, metadata: &str) -> Result<(), SinkError>;

    /// Start playback
    async fn play(&self) -> Result<(), SinkError>;

    /// Stop playback
    async fn stop(&self) -> Result<(), SinkError>;
}
