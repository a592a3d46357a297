//! Job types and the pure scheduling helpers

use chrono::{DateTime, Duration, Local, NaiveTime};
use tracing::info;

use crate::config::PrayersConfig;
use crate::prayer::{Prayer, PrayerTimes, local_datetime};

/// The daily refresh fires at 00:01 local - after midnight, before any
/// prayer of the new day.
const REFRESH_TIME: (u32, u32, u32) = (0, 1, 0);

/// A one-shot armed playback.
///
/// Lives only in the scheduler's pending set: removed when fired, or dropped
/// wholesale when a refresh replaces the set. The epoch ties it to the
/// schedule generation that created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayerJob {
    pub prayer: Prayer,
    pub fire_at: DateTime<Local>,
    pub epoch: u64,
}

/// Derive the pending job set for one day's times.
///
/// Disabled prayers are skipped, and so is any time at or before `now` - a
/// prayer already past is never armed, even on first run. Jobs are
/// independent; nothing here coalesces or reorders them.
pub fn build_schedule(
    times: &PrayerTimes,
    prayers: &PrayersConfig,
    now: DateTime<Local>,
    epoch: u64,
) -> Vec<PrayerJob> {
    let mut jobs = Vec::new();

    for (prayer, fire_at) in times.iter() {
        if !prayers.get(prayer).enabled {
            info!(%prayer, "Skipped (disabled in config)");
            continue;
        }
        if fire_at <= now {
            info!(%prayer, time = %fire_at.format("%H:%M"), "Skipped (time has passed)");
            continue;
        }
        info!(%prayer, time = %fire_at.format("%H:%M"), "Scheduled");
        jobs.push(PrayerJob { prayer, fire_at, epoch });
    }

    jobs
}

/// Next occurrence of the daily refresh: tomorrow at 00:01 local.
///
/// Computed relative to `now`, so a process started at 23:59 refreshes two
/// minutes later, and one started at 00:30 holds today's schedule until the
/// following night.
pub fn next_refresh_at(now: DateTime<Local>) -> DateTime<Local> {
    let (h, m, s) = REFRESH_TIME;
    now.date_naive()
        .succ_opt()
        .and_then(|tomorrow| local_datetime(tomorrow, NaiveTime::from_hms_opt(h, m, s)?))
        .unwrap_or_else(|| now + Duration::days(1))
}
