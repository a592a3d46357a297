//! Azand - Azan scheduler for Sonos
//!
//! Azand fetches the day's prayer times from the Aladhan API, arms a one-shot
//! job per enabled prayer, and plays the configured azan track on a Sonos
//! speaker when each job fires. A recurring refresh at one minute past
//! midnight re-fetches the times and rebuilds the whole job set.
//!
//! # Core Concepts
//!
//! - **One schedule per day**: the daily refresh replaces the entire pending
//!   job set (cancel-all-then-recreate, tracked by an epoch counter)
//! - **Gated playback**: every fire checks the shared override record first;
//!   pause/resume from the CLI or web page wins over the schedule
//! - **Shared state on disk**: the override record is a flat JSON file any
//!   control-surface process can read and write (see [`azanstore`])
//! - **Failures stay local**: a failed fetch keeps yesterday's schedule, a
//!   failed playback never takes down the scheduler loop
//!
//! # Modules
//!
//! - [`prayer`] - Aladhan prayer-time source client and types
//! - [`schedule`] - scheduler core: job set, daily refresh, gated firing
//! - [`sink`] - playback capability trait and the Sonos SOAP adapter
//! - [`web`] - phone-friendly control surface (axum)
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface
//! - [`daemon`] - PID file and background process management

pub mod cli;
pub mod config;
pub mod daemon;
pub mod prayer;
pub mod schedule;
pub mod sink;
pub mod web;

// Re-export commonly used types
pub use config::{Config, LocationConfig, PrayerTrackConfig, PrayersConfig, SpeakerConfig};
pub use prayer::{AladhanClient, Prayer, PrayerTimes, SourceError};
pub use schedule::{PrayerJob, Scheduler, build_schedule, next_refresh_at};
pub use sink::{PlaybackSink, SinkError, SonosSink};
