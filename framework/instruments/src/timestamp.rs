use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Text format of timestamps inside run documents, e.g. `2022-08-28 14:03:22.382996 UTC`.
pub const TS_FORMAT_PAYLOADS: &str = "%Y-%m-%d %H:%M:%S%.6f UTC";

/// Compact format used when naming run documents, e.g. `20220828T140322.382996Z`.
pub const TS_FORMAT_STORE: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Accepts any number of fractional digits so that hand edited documents still load.
const TS_PARSE_PAYLOADS: &str = "%Y-%m-%d %H:%M:%S%.f UTC";

/// The current time, truncated to the microsecond resolution of the payload format.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp in the payload format.
pub fn format_payload_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT_PAYLOADS).to_string()
}

/// Render a timestamp in the compact file name format.
pub fn format_store_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT_STORE).to_string()
}

/// Parse a timestamp written in the payload format.
pub fn parse_payload_ts(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, TS_PARSE_PAYLOADS).map(|naive| naive.and_utc())
}

/// Whole microseconds from `start` to `end`.
///
/// Negative when `end` precedes `start`. Saturates instead of overflowing for spans that do not
/// fit into 64 bits of microseconds.
pub fn microseconds_between(start: &DateTime<Utc>, end: &DateTime<Utc>) -> i64 {
    let delta = end.signed_duration_since(*start);
    delta
        .num_microseconds()
        .unwrap_or_else(|| delta.num_seconds().saturating_mul(1_000_000))
}

/// Seconds from `start` to `end` as a float, with microsecond precision.
pub fn seconds_between(start: &DateTime<Utc>, end: &DateTime<Utc>) -> f64 {
    microseconds_between(start, end) as f64 / 1_000_000.0
}

/// Serde adapter for `DateTime<Utc>` fields stored in the payload format.
pub mod payload_ts {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_payload_ts(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        super::parse_payload_ts(&value).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for optional `DateTime<Utc>` fields stored in the payload format or as `null`.
pub mod payload_ts_option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(ts: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match ts {
            Some(ts) => serializer.serialize_str(&super::format_payload_ts(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|value| super::parse_payload_ts(&value).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Serde adapter for lists of `DateTime<Utc>` stored in the payload format.
pub mod payload_ts_list {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(list: &[DateTime<Utc>], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(list.iter().map(super::format_payload_ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|value| super::parse_payload_ts(value).map_err(serde::de::Error::custom))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(micros: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2022, 8, 28, 14, 3, 22).unwrap()
            + chrono::Duration::microseconds(micros as i64)
    }

    #[test]
    fn test_should_format_payload_with_six_fraction_digits() {
        assert_eq!(format_payload_ts(&ts(26)), "2022-08-28 14:03:22.000026 UTC");
        assert_eq!(format_payload_ts(&ts(382996)), "2022-08-28 14:03:22.382996 UTC");
    }

    #[test]
    fn test_should_format_store_name_part() {
        assert_eq!(format_store_ts(&ts(382996)), "20220828T140322.382996Z");
    }

    #[test]
    fn test_should_parse_payload_format() {
        let parsed = parse_payload_ts("2022-08-28 14:03:22.382996 UTC").unwrap();
        assert_eq!(parsed, ts(382996));
    }

    #[test]
    fn test_should_reject_other_formats() {
        assert!(parse_payload_ts("2022-08-28T14:03:22.382996Z").is_err());
        assert!(parse_payload_ts("2022-08-28 14:03:22.382996").is_err());
    }

    #[test]
    fn test_should_count_microseconds_across_seconds() {
        let start = ts(900_000);
        let end = ts(100_000) + chrono::Duration::seconds(2);
        assert_eq!(microseconds_between(&start, &end), 1_200_000);
        assert_eq!(microseconds_between(&end, &start), -1_200_000);
        assert_eq!(microseconds_between(&start, &start), 0);
        assert_eq!(seconds_between(&start, &end), 1.2);
    }

    #[test]
    fn test_should_count_microseconds_across_days() {
        let start = ts(0);
        let end = start + chrono::Duration::days(1) + chrono::Duration::microseconds(5);
        assert_eq!(microseconds_between(&start, &end), 86_400_000_005);
    }

    #[test]
    fn test_should_serialize_optional_timestamp_as_null() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "payload_ts_option")]
            end_ts: Option<DateTime<Utc>>,
        }

        let json = serde_json::to_string(&Holder { end_ts: None }).unwrap();
        assert_eq!(json, r#"{"end_ts":null}"#);

        let holder: Holder =
            serde_json::from_str(r#"{"end_ts":"2022-08-28 14:03:22.000026 UTC"}"#).unwrap();
        assert_eq!(holder.end_ts, Some(ts(26)));
    }

    #[test]
    fn test_should_keep_order_of_timestamp_list() {
        #[derive(serde::Serialize, serde::Deserialize)]
        struct Holder {
            #[serde(with = "payload_ts_list")]
            starts: Vec<DateTime<Utc>>,
        }

        let json = serde_json::to_string(&Holder {
            starts: vec![ts(26), ts(1)],
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"starts":["2022-08-28 14:03:22.000026 UTC","2022-08-28 14:03:22.000001 UTC"]}"#
        );

        let holder: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(holder.starts, vec![ts(26), ts(1)]);
    }
}
