//! Scheduler implementation
//!
//! One task owns the pending job set and fires everything serially: no two
//! job callbacks ever run concurrently. The loop sleeps until the earliest of
//! the next pending job and the daily refresh, handles whichever is due, and
//! goes back to sleep. Callback failures are logged at the boundary and never
//! unwind into the loop.

use std::sync::Arc;

use chrono::{DateTime, Local};
use eyre::{Context, Result};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use azanstore::OverrideStore;

use crate::config::Config;
use crate::prayer::{AladhanClient, Prayer, PrayerTimes};
use crate::sink::{PlaybackSink, SinkError};

use super::jobs::{PrayerJob, build_schedule, next_refresh_at};

/// Why a single azan fire produced no playback
#[derive(Debug, Error)]
pub enum PlayError {
    #[error("No track configured for {0}")]
    MissingTrack(Prayer),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// The azan scheduler.
///
/// Owns the pending [`PrayerJob`] set and the refresh trigger exclusively;
/// shares the override store with any control-surface process.
pub struct Scheduler {
    config: Config,
    source: AladhanClient,
    sink: Arc<dyn PlaybackSink>,
    store: OverrideStore,

    /// Today's resolved times, kept for status/logging
    times: Option<PrayerTimes>,

    /// Pending jobs, all tagged with the current epoch
    jobs: Vec<PrayerJob>,

    /// Schedule generation; bumped on every successful refresh
    epoch: u64,

    /// When the daily refresh next fires
    refresh_at: DateTime<Local>,
}

impl Scheduler {
    /// Create a scheduler with an empty job set.
    ///
    /// Call [`Scheduler::init`] before [`Scheduler::run`].
    pub fn new(
        config: Config,
        source: AladhanClient,
        sink: Arc<dyn PlaybackSink>,
        store: OverrideStore,
        now: DateTime<Local>,
    ) -> Self {
        Self {
            config,
            source,
            sink,
            store,
            times: None,
            jobs: Vec::new(),
            epoch: 0,
            refresh_at: next_refresh_at(now),
        }
    }

    /// Fetch the initial schedule. Failure here is fatal: the daemon must not
    /// run with an empty schedule it never resolved.
    pub async fn init(&mut self, now: DateTime<Local>) -> Result<()> {
        let times = self
            .source
            .fetch(now.date_naive())
            .await
            .context("Cannot start without prayer times")?;
        self.arm(times, now);
        Ok(())
    }

    /// Replace the whole pending set with a fresh schedule.
    ///
    /// Cancel-all-then-recreate: the old generation's jobs vanish before the
    /// new ones are armed, so a time that shifted earlier can never fire
    /// under both schedules.
    pub fn arm(&mut self, times: PrayerTimes, now: DateTime<Local>) {
        self.epoch += 1;
        self.jobs = build_schedule(&times, &self.config.prayers, now, self.epoch);
        info!(
            epoch = self.epoch,
            pending = self.jobs.len(),
            date = %times.date,
            "Schedule armed"
        );
        self.times = Some(times);
    }

    /// Run until the shutdown channel signals.
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> Result<()> {
        info!(refresh_at = %self.refresh_at, "Scheduler running");

        loop {
            let now = Local::now();
            let wake_at = self.next_wakeup();
            let wait = (wake_at - now).to_std().unwrap_or_default();
            debug!(%wake_at, "Sleeping until next event");

            tokio::select! {
                _ = tokio::time::sleep(wait) => {
                    self.tick(Local::now()).await;
                }
                _ = shutdown.recv() => {
                    info!("Scheduler shutting down");
                    return Ok(());
                }
            }
        }
    }

    /// Earliest of the next pending job and the daily refresh
    fn next_wakeup(&self) -> DateTime<Local> {
        self.jobs
            .iter()
            .map(|j| j.fire_at)
            .min()
            .map_or(self.refresh_at, |t| t.min(self.refresh_at))
    }

    /// Handle everything due at `now`: the refresh first (so a refresh firing
    /// at 00:01 always precedes the new day's prayers), then due jobs in
    /// nondecreasing fire-time order.
    pub async fn tick(&mut self, now: DateTime<Local>) {
        if now >= self.refresh_at {
            self.on_refresh(now).await;
        }
        self.fire_due(now).await;
    }

    /// Daily refresh: re-fetch and rebuild.
    ///
    /// A failed fetch keeps the previous schedule untouched - no partial
    /// replace - and the refresh re-arms for the next day either way, so one
    /// bad night never ends the cycle.
    async fn on_refresh(&mut self, now: DateTime<Local>) {
        info!("Refreshing prayer schedule");
        self.refresh_at = next_refresh_at(now);

        match self.source.fetch(now.date_naive()).await {
            Ok(times) => self.arm(times, now),
            Err(e) => {
                error!(error = %e, "Refresh failed, keeping previous schedule");
            }
        }
    }

    /// Fire every pending job whose time has come, serially.
    async fn fire_due(&mut self, now: DateTime<Local>) {
        let mut due: Vec<PrayerJob> = Vec::new();
        self.jobs.retain(|job| {
            if job.fire_at <= now {
                due.push(job.clone());
                false
            } else {
                true
            }
        });
        due.sort_by_key(|job| job.fire_at);

        for job in due {
            if job.epoch != self.epoch {
                debug!(prayer = %job.prayer, job_epoch = job.epoch, "Dropping stale-epoch job");
                continue;
            }
            if let Err(e) = self.fire_azan(job.prayer, now).await {
                error!(prayer = %job.prayer, error = %e, "Failed to play azan");
            }
        }
    }

    /// Play the azan for one prayer, gated by the override store.
    async fn fire_azan(&self, prayer: Prayer, now: DateTime<Local>) -> Result<(), PlayError> {
        let paused = match self.store.is_effectively_paused(now) {
            Ok(paused) => paused,
            Err(e) => {
                warn!(error = %e, "Could not read override state, assuming not paused");
                false
            }
        };
        if paused {
            info!(%prayer, "Skipping azan - playback is paused");
            return Ok(());
        }

        let track = self
            .config
            .prayers
            .get(prayer)
            .track
            .clone()
            .ok_or(PlayError::MissingTrack(prayer))?;

        info!(%prayer, sink = self.sink.name(), "Playing azan");

        self.sink.set_volume(self.config.speaker.volume).await?;
        self.sink.clear_queue().await?;
        self.sink.set_transport_uri(&track, "").await?;
        self.sink.play().await?;

        Ok(())
    }

    /// Today's resolved times, if any
    pub fn times(&self) -> Option<&PrayerTimes> {
        self.times.as_ref()
    }

    /// Pending jobs (current epoch only by construction)
    pub fn pending(&self) -> &[PrayerJob] {
        &self.jobs
    }

    /// Current schedule generation
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// When the daily refresh next fires
    pub fn refresh_at(&self) -> DateTime<Local> {
        self.refresh_at
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::*;

    /// Sink that records calls and optionally fails them all
    struct MockSink {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockSink {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        fn record(&self, call: &str) -> Result<(), SinkError> {
            self.calls.lock().unwrap().push(call.to_string());
            if self.fail {
                Err(SinkError::Soap {
                    action: call.to_string(),
                    status: 500,
                })
            } else {
                Ok(())
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PlaybackSink for MockSink {
        fn name(&self) -> &str {
            "mock"
        }

        async fn set_volume(&self, volume: u8) -> Result<(), SinkError> {
            self.record(&format!("set_volume({})", volume))
        }

        async fn clear_queue(&self) -> Result<(), SinkError> {
            self.record("clear_queue")
        }

        async fn set_transport_uri(&self, track: &str, _metadata: &str) -> Result<(), SinkError> {
            self.record(&format!("set_transport_uri({})", track))
        }

        async fn play(&self) -> Result<(), SinkError> {
            self.record("play")
        }

        async fn stop(&self) -> Result<(), SinkError> {
            self.record("stop")
        }
    }

    fn at(d: u32, h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, d, h, m, 0).unwrap()
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.speaker.address = Some("10.0.0.5".to_string());
        config.speaker.volume = 25;
        for p in [&mut config.prayers.dhuhr, &mut config.prayers.isha] {
            p.enabled = true;
            p.track = Some("spotify:track:abc".to_string());
        }
        config
    }

    fn times_for_day(d: u32) -> PrayerTimes {
        let mut times = BTreeMap::new();
        times.insert(Prayer::Fajr, at(d, 5, 12));
        times.insert(Prayer::Dhuhr, at(d, 12, 30));
        times.insert(Prayer::Asr, at(d, 15, 45));
        times.insert(Prayer::Maghrib, at(d, 18, 20));
        times.insert(Prayer::Isha, at(d, 20, 0));
        PrayerTimes {
            date: chrono::NaiveDate::from_ymd_opt(2024, 1, d).unwrap(),
            times,
            sunrise: None,
        }
    }

    fn scheduler(config: Config, sink: Arc<MockSink>, dir: &TempDir, now: DateTime<Local>) -> Scheduler {
        let source = AladhanClient::new(&config.location).unwrap();
        let store = OverrideStore::open(dir.path().join("override.json")).unwrap();
        Scheduler::new(config, source, sink, store, now)
    }

    #[tokio::test]
    async fn test_fire_runs_sink_sequence_in_order() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));

        sched.arm(times_for_day(10), at(10, 9, 0));
        sched.tick(at(10, 12, 30)).await;

        assert_eq!(
            sink.calls(),
            vec![
                "set_volume(25)",
                "clear_queue",
                "set_transport_uri(spotify:track:abc)",
                "play",
            ]
        );
        // Dhuhr fired and left the pending set; Isha remains.
        assert_eq!(sched.pending().len(), 1);
        assert_eq!(sched.pending()[0].prayer, Prayer::Isha);
    }

    #[tokio::test]
    async fn test_fired_job_never_refires() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));

        sched.arm(times_for_day(10), at(10, 9, 0));
        sched.tick(at(10, 12, 30)).await;
        sched.tick(at(10, 12, 31)).await;

        // Only one full playback sequence.
        assert_eq!(sink.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_paused_gate_short_circuits_sink() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));
        sched.store.pause(at(10, 9, 0), None).unwrap();

        sched.arm(times_for_day(10), at(10, 9, 0));
        sched.tick(at(10, 12, 30)).await;

        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_expired_pause_plays_and_clears() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));
        sched.store.pause(at(10, 12, 0), Some(15)).unwrap();

        sched.arm(times_for_day(10), at(10, 9, 0));
        sched.tick(at(10, 12, 30)).await;

        assert_eq!(sink.calls().len(), 4);
        assert!(!sched.store.read().unwrap().paused);
    }

    #[tokio::test]
    async fn test_missing_track_skips_playback_only() {
        let mut config = test_config();
        config.prayers.dhuhr.track = None;

        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(config, sink.clone(), &dir, at(10, 9, 0));

        sched.arm(times_for_day(10), at(10, 9, 0));
        sched.tick(at(10, 12, 30)).await;

        // Dhuhr produced nothing; Isha still fires later.
        assert!(sink.calls().is_empty());
        sched.tick(at(10, 20, 0)).await;
        assert_eq!(sink.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_later_jobs() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::failing());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));

        sched.arm(times_for_day(10), at(10, 9, 0));
        // Both jobs due at once; the first one's failure must not cancel the second.
        sched.tick(at(10, 21, 0)).await;

        // Each attempt stopped at its first failing call, but both were attempted.
        assert_eq!(sink.calls(), vec!["set_volume(25)", "set_volume(25)"]);
    }

    #[tokio::test]
    async fn test_arm_replaces_whole_set_and_bumps_epoch() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));

        sched.arm(times_for_day(10), at(10, 9, 0));
        let first_epoch = sched.epoch();
        assert_eq!(sched.pending().len(), 2);

        sched.arm(times_for_day(11), at(11, 0, 1));
        assert_eq!(sched.epoch(), first_epoch + 1);
        assert_eq!(sched.pending().len(), 2);
        assert!(sched.pending().iter().all(|j| j.epoch == sched.epoch()));
        assert!(sched.pending().iter().all(|j| j.fire_at > at(11, 0, 0)));
    }

    #[tokio::test]
    async fn test_stale_epoch_job_is_dropped_not_fired() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink.clone(), &dir, at(10, 9, 0));

        sched.arm(times_for_day(10), at(10, 9, 0));
        // A leftover from a previous generation that somehow survived.
        sched.jobs.push(PrayerJob {
            prayer: Prayer::Fajr,
            fire_at: at(10, 9, 30),
            epoch: sched.epoch() - 1,
        });

        sched.tick(at(10, 9, 30)).await;
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_pending_before_it_fires() {
        // Scheduled at 23:59, the refresh waits for 00:01 the next day; a tick
        // at 00:00:30 fires nothing and leaves yesterday's future jobs alone.
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut config = test_config();
        config.prayers.fajr.enabled = true;
        config.prayers.fajr.track = Some("spotify:track:abc".to_string());
        let mut sched = scheduler(config, sink.clone(), &dir, at(10, 23, 59));

        assert_eq!(sched.refresh_at(), at(11, 0, 1));

        // Hand-arm tomorrow's Fajr as a leftover pending job.
        let epoch = sched.epoch();
        sched.jobs.push(PrayerJob {
            prayer: Prayer::Fajr,
            fire_at: at(11, 5, 12),
            epoch,
        });

        let half_past_midnight = Local.with_ymd_and_hms(2024, 1, 11, 0, 0, 30).unwrap();
        sched.fire_due(half_past_midnight).await;

        assert!(half_past_midnight < sched.refresh_at());
        assert_eq!(sched.pending().len(), 1);
        assert!(sink.calls().is_empty());
    }

    #[tokio::test]
    async fn test_next_wakeup_is_min_of_job_and_refresh() {
        let dir = TempDir::new().unwrap();
        let sink = Arc::new(MockSink::new());
        let mut sched = scheduler(test_config(), sink, &dir, at(10, 9, 0));

        // Empty set: wake at the refresh.
        assert_eq!(sched.next_wakeup(), sched.refresh_at());

        sched.arm(times_for_day(10), at(10, 9, 0));
        assert_eq!(sched.next_wakeup(), at(10, 12, 30));
    }
}
