//! Date normalization. Five encodings are accepted and all normalize
//! through [`epoch_millis`], so equal instants always yield equal output:
//!
//!   { "$date": "2020-01-31T10:00:00Z" }
//!   { "$date": 1580464800000 }
//!   { "$date": { "$numberLong": "1580464800000" } }
//!   "2020-01-31T10:00:00Z"
//!   1580464800000

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

use subsearch_types::{Error, Result};

/// Extract epoch milliseconds from any accepted encoding. Missing or null
/// input yields `None`; a present but malformed value is a parse error.
pub fn epoch_millis(value: Option<&Value>) -> Result<Option<i64>> {
    let value = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::ParseError(format!("bad epoch value: {}", n))),
        Value::String(s) => parse_iso(s).map(Some),
        Value::Object(map) => epoch_millis_object(map),
        other => Err(Error::ParseError(format!("unsupported date encoding: {}", other))),
    }
}

fn epoch_millis_object(map: &serde_json::Map<String, Value>) -> Result<Option<i64>> {
    let inner = match map.get("$date") {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };
    match inner {
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::ParseError(format!("bad $date value: {}", n))),
        Value::String(s) => parse_iso(s).map(Some),
        Value::Object(long) => match long.get("$numberLong") {
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Some)
                .map_err(|e| Error::ParseError(format!("bad $numberLong: {}", e))),
            Some(Value::Number(n)) => Ok(n.as_i64()),
            _ => Err(Error::ParseError("missing $numberLong value".into())),
        },
        other => Err(Error::ParseError(format!("unsupported $date encoding: {}", other))),
    }
}

fn parse_iso(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap()).timestamp_millis());
    }
    Err(Error::ParseError(format!("unparsable date: {}", raw)))
}

/// UTC year of an epoch-millisecond instant
pub fn year_of(millis: i64) -> Option<i32> {
    Utc.timestamp_millis_opt(millis).single().map(|dt| dt.year())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const INSTANT: i64 = 1_580_464_800_000;

    #[test]
    fn five_encodings_agree() {
        let encodings = vec![
            json!({ "$date": "2020-01-31T10:00:00Z" }),
            json!({ "$date": INSTANT }),
            json!({ "$date": { "$numberLong": "1580464800000" } }),
            json!("2020-01-31T10:00:00Z"),
            json!(INSTANT),
        ];
        for encoding in &encodings {
            assert_eq!(epoch_millis(Some(encoding)).unwrap(), Some(INSTANT));
        }
    }

    #[test]
    fn missing_and_null_are_none() {
        assert_eq!(epoch_millis(None).unwrap(), None);
        assert_eq!(epoch_millis(Some(&Value::Null)).unwrap(), None);
        assert_eq!(epoch_millis(Some(&json!({ "$date": null }))).unwrap(), None);
    }

    #[test]
    fn malformed_is_an_error() {
        assert_eq!(epoch_millis(Some(&json!("not a date"))).is_err(), true);
        assert_eq!(epoch_millis(Some(&json!({ "$date": true }))).is_err(), true);
    }

    #[test]
    fn bare_date_parses_at_midnight() {
        let millis = epoch_millis(Some(&json!("2020-01-31"))).unwrap().unwrap();
        assert_eq!(year_of(millis), Some(2020));
    }

    #[test]
    fn year_derivation() {
        assert_eq!(year_of(INSTANT), Some(2020));
        assert_eq!(year_of(0), Some(1970));
    }
}
