//! Prayer names and the per-day time resolution

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::offset::LocalResult;
use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

/// The five daily prayers, in canonical order.
///
/// Sunrise is reported by the source but is not a prayer and never plays;
/// it is carried separately on [`PrayerTimes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Prayer {
    Fajr,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl Prayer {
    /// All prayers in canonical order
    pub const ALL: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];

    /// The name the Aladhan API uses for this prayer
    pub fn api_name(&self) -> &'static str {
        match self {
            Prayer::Fajr => "Fajr",
            Prayer::Dhuhr => "Dhuhr",
            Prayer::Asr => "Asr",
            Prayer::Maghrib => "Maghrib",
            Prayer::Isha => "Isha",
        }
    }
}

impl fmt::Display for Prayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.api_name())
    }
}

impl FromStr for Prayer {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fajr" => Ok(Prayer::Fajr),
            "dhuhr" => Ok(Prayer::Dhuhr),
            "asr" => Ok(Prayer::Asr),
            "maghrib" => Ok(Prayer::Maghrib),
            "isha" => Ok(Prayer::Isha),
            _ => Err(format!("Unknown prayer: {}", s)),
        }
    }
}

/// One day's resolved prayer times.
///
/// Immutable once fetched; the next day's fetch produces a new value rather
/// than mutating this one.
#[derive(Debug, Clone)]
pub struct PrayerTimes {
    /// The calendar day these times belong to
    pub date: NaiveDate,

    /// Wall-clock time per prayer
    pub times: BTreeMap<Prayer, DateTime<Local>>,

    /// Sunrise, when the source reports it (display only)
    pub sunrise: Option<DateTime<Local>>,
}

impl PrayerTimes {
    /// Time of a single prayer
    pub fn get(&self, prayer: Prayer) -> Option<DateTime<Local>> {
        self.times.get(&prayer).copied()
    }

    /// Iterate prayers in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Prayer, DateTime<Local>)> + '_ {
        Prayer::ALL
            .iter()
            .filter_map(|p| self.get(*p).map(|t| (*p, t)))
    }
}

/// Resolve a naive date + time to local wall-clock time.
///
/// DST ambiguity takes the earlier instant; a time that does not exist on
/// that day (spring-forward gap) resolves to `None`.
pub fn local_datetime(date: NaiveDate, time: NaiveTime) -> Option<DateTime<Local>> {
    match Local.from_local_datetime(&date.and_time(time)) {
        LocalResult::Single(dt) => Some(dt),
        LocalResult::Ambiguous(earlier, _) => Some(earlier),
        LocalResult::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prayer_order_is_canonical() {
        assert!(Prayer::Fajr < Prayer::Dhuhr);
        assert!(Prayer::Maghrib < Prayer::Isha);
        assert_eq!(Prayer::ALL.len(), 5);
    }

    #[test]
    fn test_prayer_from_str() {
        assert_eq!("fajr".parse::<Prayer>(), Ok(Prayer::Fajr));
        assert_eq!("Maghrib".parse::<Prayer>(), Ok(Prayer::Maghrib));
        assert!("sunrise".parse::<Prayer>().is_err());
    }

    #[test]
    fn test_prayer_display_roundtrip() {
        for prayer in Prayer::ALL {
            assert_eq!(prayer.to_string().parse::<Prayer>(), Ok(prayer));
        }
    }

    #[test]
    fn test_times_iterate_in_order() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let mut times = BTreeMap::new();
        for (prayer, hm) in [(Prayer::Isha, (20, 0)), (Prayer::Fajr, (5, 12))] {
            let t = NaiveTime::from_hms_opt(hm.0, hm.1, 0).unwrap();
            times.insert(prayer, local_datetime(date, t).unwrap());
        }
        let pt = PrayerTimes {
            date,
            times,
            sunrise: None,
        };

        let order: Vec<Prayer> = pt.iter().map(|(p, _)| p).collect();
        assert_eq!(order, vec![Prayer::Fajr, Prayer::Isha]);
    }
}
