//! Aladhan API client
//!
//! One GET per day: `timingsByCity` for a date, city, country and calculation
//! method. Values come back as `HH:MM`, sometimes with trailing timezone text
//! that gets stripped before parsing.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use tracing::{debug, info};

use crate::config::LocationConfig;

use super::error::SourceError;
use super::types::{Prayer, PrayerTimes, local_datetime};

const BASE_URL: &str = "http://api.aladhan.com";

/// HTTP timeout for a timings fetch
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the Aladhan prayer-times API
#[derive(Debug, Clone)]
pub struct AladhanClient {
    client: reqwest::Client,
    base_url: String,
    location: LocationConfig,
}

impl AladhanClient {
    /// Create a client for the configured location
    pub fn new(location: &LocationConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
            location: location.clone(),
        })
    }

    /// Fetch the prayer times for a calendar day
    pub async fn fetch(&self, date: NaiveDate) -> Result<PrayerTimes, SourceError> {
        let url = format!("{}/v1/timingsByCity/{}", self.base_url, date.format("%d-%m-%Y"));

        info!(
            city = %self.location.city,
            country = %self.location.country,
            %date,
            "Fetching prayer times"
        );

        let method = self.location.method.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("city", self.location.city.as_str()),
                ("country", self.location.country.as_str()),
                ("method", method.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;

        let code = body["code"].as_i64().unwrap_or(status.as_u16() as i64);
        if !status.is_success() || code != 200 {
            // On failure the API puts a message string where `data` usually is
            let message = body["data"]
                .as_str()
                .unwrap_or("unable to fetch prayer times")
                .to_string();
            return Err(SourceError::Api { code, message });
        }

        let timings: HashMap<String, String> = serde_json::from_value(body["data"]["timings"].clone())
            .map_err(|e| SourceError::InvalidResponse(format!("missing timings: {}", e)))?;

        let times = resolve_times(date, &timings)?;

        for (prayer, time) in times.iter() {
            debug!(%prayer, time = %time.format("%H:%M"), "Resolved");
        }

        Ok(times)
    }
}

/// Build a [`PrayerTimes`] from the raw timings map.
///
/// Each of the five prayers must be present and parseable; Sunrise is
/// optional and carried for display only.
fn resolve_times(date: NaiveDate, timings: &HashMap<String, String>) -> Result<PrayerTimes, SourceError> {
    let mut times = BTreeMap::new();

    for prayer in Prayer::ALL {
        let raw = timings
            .get(prayer.api_name())
            .ok_or_else(|| SourceError::InvalidResponse(format!("no timing for {}", prayer)))?;
        let time = parse_timing(raw)?;
        let at = local_datetime(date, time)
            .ok_or_else(|| SourceError::InvalidResponse(format!("{} {} is not a valid local time", prayer, time)))?;
        times.insert(prayer, at);
    }

    let sunrise = timings
        .get("Sunrise")
        .and_then(|raw| parse_timing(raw).ok())
        .and_then(|time| local_datetime(date, time));

    Ok(PrayerTimes { date, times, sunrise })
}

/// Parse an `HH:MM` value, stripping any trailing suffix (`"05:12 (CET)"`).
fn parse_timing(raw: &str) -> Result<NaiveTime, SourceError> {
    let value = raw
        .split_whitespace()
        .next()
        .ok_or_else(|| SourceError::InvalidResponse(format!("empty timing value: {:?}", raw)))?;

    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| SourceError::InvalidResponse(format!("bad timing value: {:?}", raw)))
}
