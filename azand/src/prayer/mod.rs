//! Prayer-time source: types and the Aladhan API client

mod aladhan;
mod error;
mod types;

pub use aladhan::AladhanClient;
pub use error::SourceError;
pub use types::{Prayer, PrayerTimes, local_datetime};
