//! Resume-point resolution.
//!
//! On (re)start the uploader asks the remote for the most recent row it
//! holds for this device, then reconciles that against local retention and
//! the configured start date. The reconciled cursor is the boundary below
//! which data is assumed durably stored remotely: never resume before
//! retention begins, never resume before the configured cutoff, and never
//! re-send anything the remote already has.

use serde_json::Value;

use crate::config::UploadConfig;
use crate::timestamp;

/// Upload progress cursor.
///
/// `last_sent` only advances after the remote confirms acceptance of the
/// batch containing that timestamp; `last_post` trails the most recently
/// buffered-but-unconfirmed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResumeCursor {
    /// Timestamp of the newest row confirmed by the remote, epoch seconds.
    /// Always a multiple of the upload interval.
    pub last_sent: u32,
    /// Timestamp of the newest row written into the current batch.
    pub last_post: u32,
}

/// Builds the read-only query for the most recent remote row.
///
/// `GET /[schema.]table?select=timestamp&device=eq.<device>`
/// `&order=timestamp.desc&limit=1`
pub fn query_path(config: &UploadConfig, device: &str) -> String {
    format!(
        "{}?select=timestamp&device=eq.{device}&order=timestamp.desc&limit=1",
        config.endpoint_path()
    )
}

/// Extracts the newest remote timestamp from a resume-query response body.
///
/// The remote answers with a JSON array of at most one object carrying a
/// textual `timestamp` field. A malformed body, an empty array, a missing
/// field, or an unparseable timestamp all resolve to `0` ("no resume data
/// found") — none of them are errors.
pub fn latest_remote_timestamp(body: &str) -> u32 {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return timestamp::UNKNOWN;
    };

    value
        .as_array()
        .and_then(|rows| rows.first())
        .and_then(|row| row.get("timestamp"))
        .and_then(Value::as_str)
        .map_or(timestamp::UNKNOWN, timestamp::parse)
}

/// Reconciles the remote timestamp with local constraints.
///
/// Returns `max(remote, start_date, first_retained)`, floored to the
/// nearest interval boundary so `last_sent % interval == 0` holds from the
/// start.
pub fn reconcile(remote: u32, start_date: u32, first_retained: u32, interval: u32) -> u32 {
    let resolved = remote.max(start_date).max(first_retained);
    resolved - resolved % interval
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(schema: &str) -> UploadConfig {
        let mut config = UploadConfig::from_json_str(r#"{"table": "readings"}"#).unwrap();
        config.schema = schema.to_string();
        config
    }

    #[test]
    fn test_query_path_default_schema() {
        assert_eq!(
            query_path(&config("public"), "iw42"),
            "/readings?select=timestamp&device=eq.iw42&order=timestamp.desc&limit=1"
        );
    }

    #[test]
    fn test_query_path_custom_schema() {
        assert_eq!(
            query_path(&config("sensors"), "iw42"),
            "/sensors.readings?select=timestamp&device=eq.iw42&order=timestamp.desc&limit=1"
        );
    }

    #[test]
    fn test_latest_remote_timestamp() {
        let body = r#"[{"timestamp": "2023-10-15T14:30:00Z"}]"#;
        assert_eq!(latest_remote_timestamp(body), 1_697_380_200);
    }

    #[test]
    fn test_latest_remote_timestamp_degrades_to_zero() {
        // Empty result set.
        assert_eq!(latest_remote_timestamp("[]"), 0);
        // Not JSON at all.
        assert_eq!(latest_remote_timestamp("<html>error</html>"), 0);
        // Missing field.
        assert_eq!(latest_remote_timestamp(r#"[{"device": "iw42"}]"#), 0);
        // Unparseable timestamp.
        assert_eq!(latest_remote_timestamp(r#"[{"timestamp": "soon"}]"#), 0);
        // Wrong type.
        assert_eq!(latest_remote_timestamp(r#"[{"timestamp": 12}]"#), 0);
    }

    #[test]
    fn test_reconcile_takes_maximum() {
        assert_eq!(reconcile(1000, 0, 0, 60), 960);
        assert_eq!(reconcile(0, 1000, 0, 60), 960);
        assert_eq!(reconcile(0, 0, 1000, 60), 960);
        assert_eq!(reconcile(500, 1000, 700, 60), 960);
    }

    #[test]
    fn test_reconcile_floors_to_interval() {
        for interval in [1u32, 5, 10, 60, 300] {
            let resolved = reconcile(1_697_380_225, 0, 0, interval);
            assert_eq!(resolved % interval, 0);
            assert!(resolved <= 1_697_380_225);
            assert!(1_697_380_225 - resolved < interval);
        }
    }

    #[test]
    fn test_reconcile_exact_boundary_unchanged() {
        assert_eq!(reconcile(1_697_380_200, 0, 0, 60), 1_697_380_200);
    }
}
