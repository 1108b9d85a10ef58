use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::timestamp;
use crate::error::{AppError, AppResult};

static CLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):([0-5]\d)$").expect("valid clock regex"));

/// One night of sleep; at most one per user and `log_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepLog {
    pub id: String,
    pub user_id: String,
    pub log_date: NaiveDate,
    #[serde(with = "timestamp::option", default)]
    pub bedtime: Option<DateTime<Utc>>,
    #[serde(with = "timestamp::option", default)]
    pub wake_time: Option<DateTime<Utc>>,
    pub fatigue_level: u8,
    pub had_nap: bool,
    pub nap_duration: Option<u32>,
    pub notes: Option<String>,
    /// Offset the form was filled in at, used to show the times back.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl SleepLog {
    /// Hours between bedtime and wake time; 0 when either is missing.
    pub fn sleep_hours(&self) -> f64 {
        match (self.bedtime, self.wake_time) {
            (Some(bed), Some(wake)) => (wake - bed).num_milliseconds() as f64 / 3_600_000.0,
            _ => 0.0,
        }
    }
}

/// Payload of the daily log form.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SleepLogInput {
    /// Local wall-clock time, `HH:MM`.
    #[serde(default)]
    pub bedtime: Option<String>,
    /// Local wall-clock time, `HH:MM`.
    #[serde(default)]
    pub wake_time: Option<String>,
    #[validate(range(min = 1, max = 5, message = "fatigue level must be between 1 and 5"))]
    pub fatigue_level: u8,
    #[serde(default)]
    pub had_nap: bool,
    #[validate(range(max = 240, message = "nap duration must be at most 240 minutes"))]
    pub nap_duration: Option<u32>,
    #[validate(length(max = 2000, message = "notes must be at most 2000 characters"))]
    pub notes: Option<String>,
    pub log_date: Option<NaiveDate>,
    #[validate(range(min = -840, max = 840, message = "utc offset out of range"))]
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SleepLogInput {
    /// Builds the stored row. Both times are anchored on the log date; a
    /// wake time earlier than the bedtime belongs to the following day.
    pub fn into_log(self, user_id: &str, now: DateTime<Utc>) -> AppResult<SleepLog> {
        let (bedtime, wake_time) = match (non_blank(self.bedtime), non_blank(self.wake_time)) {
            (Some(b), Some(w)) => (b, w),
            _ => {
                return Err(AppError::rejected(
                    "Missing info",
                    "Please fill in your bedtime and wake time",
                ))
            }
        };
        let bed_clock = parse_clock("bedtime", &bedtime)?;
        let wake_clock = parse_clock("wake time", &wake_time)?;
        let offset = offset_from_minutes(self.utc_offset_minutes)?;
        let log_date = self
            .log_date
            .unwrap_or_else(|| today_at(now, self.utc_offset_minutes));

        let (bed_local, wake_local) = anchor_night(log_date, bed_clock, wake_clock);
        let to_utc = |local: chrono::NaiveDateTime| {
            (local - Duration::seconds(offset.local_minus_utc() as i64)).and_utc()
        };

        Ok(SleepLog {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            log_date,
            bedtime: Some(to_utc(bed_local)),
            wake_time: Some(to_utc(wake_local)),
            fatigue_level: self.fatigue_level,
            had_nap: self.had_nap,
            nap_duration: self.had_nap.then(|| self.nap_duration.unwrap_or(0)),
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            utc_offset_minutes: self.utc_offset_minutes,
            created_at: now,
            updated_at: now,
        })
    }
}

/// A stored log shown back in the form's shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SleepLogView {
    pub log_date: NaiveDate,
    pub bedtime: Option<String>,
    pub wake_time: Option<String>,
    pub fatigue_level: u8,
    pub had_nap: bool,
    pub nap_duration: Option<u32>,
    pub notes: Option<String>,
}

impl From<&SleepLog> for SleepLogView {
    fn from(log: &SleepLog) -> Self {
        let clock = |t: Option<DateTime<Utc>>| {
            t.map(|t| {
                (t + Duration::minutes(log.utc_offset_minutes as i64))
                    .format("%H:%M")
                    .to_string()
            })
        };
        SleepLogView {
            log_date: log.log_date,
            bedtime: clock(log.bedtime),
            wake_time: clock(log.wake_time),
            fatigue_level: log.fatigue_level,
            had_nap: log.had_nap,
            nap_duration: log.nap_duration,
            notes: log.notes.clone(),
        }
    }
}

/// Places both clock times on `date`, rolling the wake time over midnight
/// when it is earlier than the bedtime.
pub fn anchor_night(
    date: NaiveDate,
    bedtime: NaiveTime,
    wake_time: NaiveTime,
) -> (chrono::NaiveDateTime, chrono::NaiveDateTime) {
    let bed = date.and_time(bedtime);
    let mut wake = date.and_time(wake_time);
    if wake < bed {
        wake += Duration::days(1);
    }
    (bed, wake)
}

/// Calendar date at `offset_minutes` east of UTC.
pub fn today_at(now: DateTime<Utc>, offset_minutes: i32) -> NaiveDate {
    (now + Duration::minutes(offset_minutes as i64)).date_naive()
}

fn offset_from_minutes(minutes: i32) -> AppResult<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
        .ok_or_else(|| AppError::BadRequest("utc offset out of range".into()))
}

fn parse_clock(field: &str, raw: &str) -> AppResult<NaiveTime> {
    let caps = CLOCK
        .captures(raw.trim())
        .ok_or_else(|| AppError::BadRequest(format!("{field} must be HH:MM")))?;
    let hour = caps[1].parse().unwrap_or(0);
    let minute = caps[2].parse().unwrap_or(0);
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| AppError::BadRequest(format!("{field} must be HH:MM")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
