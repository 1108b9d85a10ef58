mod chat_message;
mod organization;
mod profile;
mod sleep_log;

pub use chat_message::ChatMessage;
pub use organization::{generate_code, normalize_code, InviteCode, Organization, RedeemError};
pub use profile::{default_display_name, Profile};
pub use sleep_log::{SleepLog, SleepLogInput, SleepLogView};

/// Timestamps are stored as fixed-width RFC 3339 strings (millisecond
/// precision, `Z` suffix) so that string order in the store matches
/// chronological order for sorting and range filters.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            s: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => s.serialize_some(&format(dt)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            d: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| {
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(D::Error::custom)
                })
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::timestamp;
    use chrono::{TimeZone, Utc};

    #[test]
    fn timestamps_sort_as_strings() {
        let whole = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let later = whole + chrono::Duration::milliseconds(500);
        assert_eq!(timestamp::format(&whole), "2026-10-19T12:00:00.000Z");
        assert!(timestamp::format(&whole) < timestamp::format(&later));
    }
}
