use chrono::{Local, NaiveDateTime, SubsecRound};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire format of `published_time`.
pub const PUBLISHED_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// The JSON object published on the broker for every event.
///
/// ```json
/// {"event": "user.created", "service": "users",
///  "published_time": "2026-10-19 12:00:00", "data": {"id": 42}}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub event: String,
    pub service: String,
    #[serde(with = "published_time")]
    pub published_time: NaiveDateTime,
    pub data: Map<String, Value>,
}

impl EventEnvelope {
    pub fn new(
        event: &str,
        service: &str,
        published_time: NaiveDateTime,
        data: Map<String, Value>,
    ) -> Self {
        Self {
            event: event.to_string(),
            service: service.to_string(),
            published_time,
            data,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

mod published_time {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::PUBLISHED_TIME_FORMAT;

    pub fn serialize<S: Serializer>(time: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format(PUBLISHED_TIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, PUBLISHED_TIME_FORMAT).map_err(serde::de::Error::custom)
    }
}

/// Hands out `published_time` values: local wall time at second precision,
/// never earlier than the previous value.
#[derive(Debug, Default)]
pub struct PublishClock {
    last: Option<NaiveDateTime>,
}

impl PublishClock {
    pub fn stamp(&mut self) -> NaiveDateTime {
        self.stamp_at(Local::now().naive_local())
    }

    pub fn stamp_at(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        let now = now.trunc_subsecs(0);
        let stamped = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(stamped);
        stamped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32, milli: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_milli_opt(h, m, s, milli)
            .unwrap()
    }

    #[test]
    fn envelope_serializes_in_wire_order_and_format() {
        let data = json!({"id": 42}).as_object().cloned().unwrap();
        let envelope = EventEnvelope::new("user.created", "users", at(9, 5, 7, 0), data);

        assert_eq!(
            envelope.to_json().unwrap(),
            r#"{"event":"user.created","service":"users","published_time":"2026-10-19 09:05:07","data":{"id":42}}"#
        );
    }

    #[test]
    fn envelope_reads_back_from_wire() {
        let raw = r#"{"event":"e","service":"s","published_time":"2026-01-02 03:04:05","data":{}}"#;
        let envelope: EventEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(envelope.published_time.format(PUBLISHED_TIME_FORMAT).to_string(), "2026-01-02 03:04:05");

        let bad = r#"{"event":"e","service":"s","published_time":"yesterday","data":{}}"#;
        assert!(serde_json::from_str::<EventEnvelope>(bad).is_err());
    }

    #[test]
    fn clock_truncates_to_seconds() {
        let mut clock = PublishClock::default();
        assert_eq!(clock.stamp_at(at(10, 0, 0, 999)), at(10, 0, 0, 0));
    }

    #[test]
    fn clock_never_goes_backwards() {
        let mut clock = PublishClock::default();
        assert_eq!(clock.stamp_at(at(10, 0, 5, 0)), at(10, 0, 5, 0));
        // wall clock stepped back
        assert_eq!(clock.stamp_at(at(10, 0, 1, 0)), at(10, 0, 5, 0));
        assert_eq!(clock.stamp_at(at(10, 0, 6, 0)), at(10, 0, 6, 0));
    }
}
