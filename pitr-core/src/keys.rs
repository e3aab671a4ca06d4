//! Persisted key layout and instant encoding.
//!
//! Under a bucket prefix `P`:
//! - chunks: `P/oplog/<from>_<to>.tar.gz`
//! - chain cursor: `P/oplog/oplog_config.json`
//! - full backups: `P/full_backups/<created_at>.<ext>` or `P/<db>_database_backups/<created_at>.<ext>`
//!
//! Instants are written as RFC 3339 in UTC with millisecond precision
//! (`2024-01-02T03:04:05.678+00:00`), which is fixed width and sorts lexically.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Timelike, Utc};

use crate::chunk::{Instant, TimeRange};
use crate::error::{ChronologyError, Result};

pub const OPLOG_DIR: &str = "oplog";
pub const CURSOR_FILE_NAME: &str = "oplog_config.json";
pub const CHUNK_EXTENSION: &str = ".tar.gz";
pub const FULL_BACKUPS_DIR: &str = "full_backups";
pub const DATABASE_BACKUPS_SUFFIX: &str = "_database_backups";
pub const GZIP_EXTENSION: &str = ".gzip";
pub const ARCHIVE_EXTENSION: &str = ".archive";
pub const HUMAN_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const RANGE_SEPARATOR: char = '_';

fn join(prefix: &str, segment: &str) -> String {
    let p = prefix.trim_matches('/');
    if p.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", p, segment)
    }
}

/// Directory holding chunks and the cursor, with a trailing slash.
pub fn chunk_prefix(prefix: &str) -> String {
    format!("{}/", join(prefix, OPLOG_DIR))
}

pub fn cursor_key(prefix: &str) -> String {
    format!("{}{}", chunk_prefix(prefix), CURSOR_FILE_NAME)
}

/// Directory holding full backups for `database` (whole cluster when `None`), with a trailing slash.
pub fn full_backup_prefix(prefix: &str, database: Option<&str>) -> String {
    let kind = match database {
        Some(db) if !db.is_empty() => format!("{}{}", db, DATABASE_BACKUPS_SUFFIX),
        _ => FULL_BACKUPS_DIR.to_string(),
    };
    format!("{}/", join(prefix, &kind))
}

/// Everything stored under `prefix`, with a trailing slash (empty for the bucket root).
pub fn prefix_root(prefix: &str) -> String {
    let p = prefix.trim_matches('/');
    if p.is_empty() {
        String::new()
    } else {
        format!("{}/", p)
    }
}

/// Backup set a key under `prefix` belongs to: `Some(None)` for whole-cluster backups,
/// `Some(Some(db))` for one database, `None` for chunks and anything else.
pub fn backup_set_of(prefix: &str, key: &str) -> Option<Option<String>> {
    let rest = key.strip_prefix(prefix_root(prefix).as_str())?;
    let (dir, _) = rest.split_once('/')?;
    if dir == FULL_BACKUPS_DIR {
        return Some(None);
    }
    match dir.strip_suffix(DATABASE_BACKUPS_SUFFIX) {
        Some(db) if !db.is_empty() => Some(Some(db.to_string())),
        _ => None,
    }
}

pub fn truncate_millis(t: Instant) -> Instant {
    let nanos = t.nanosecond() / 1_000_000 * 1_000_000;
    t.with_nanosecond(nanos).unwrap_or(t)
}

pub fn format_instant(t: Instant) -> String {
    truncate_millis(t).to_rfc3339_opts(SecondsFormat::Millis, false)
}

/// Parse the persisted form. Only the canonical encoding is accepted so that
/// decode/encode round-trips byte for byte.
pub fn parse_instant(s: &str) -> Result<Instant> {
    let parsed = DateTime::parse_from_rfc3339(s)
        .map_err(|e| ChronologyError::InvalidInstant(format!("{}: {}", s, e)))?
        .with_timezone(&Utc);
    if format_instant(parsed) != s {
        return Err(ChronologyError::InvalidInstant(format!(
            "{} is not in canonical UTC millisecond form",
            s
        )));
    }
    Ok(parsed)
}

/// Parse an operator-supplied instant: `YYYY-MM-DD HH:MM:SS` (UTC) or RFC 3339.
pub fn parse_human_instant(s: &str) -> Result<Instant> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, HUMAN_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ChronologyError::InvalidInstant(format!("{}: {}", s, e)))
}

pub fn format_human_instant(t: Instant) -> String {
    format!("{} UTC", t.format(HUMAN_TIME_FORMAT))
}

pub fn encode_chunk_key(prefix: &str, range: &TimeRange) -> String {
    format!(
        "{}{}{}{}{}",
        chunk_prefix(prefix),
        format_instant(range.from),
        RANGE_SEPARATOR,
        format_instant(range.to),
        CHUNK_EXTENSION
    )
}

/// Decode `key` (as listed under `chunk_prefix`) into its time range.
pub fn decode_chunk_key(chunk_prefix: &str, key: &str) -> Result<TimeRange> {
    let corrupt = |reason: String| ChronologyError::CatalogCorruption {
        key: key.to_string(),
        reason,
    };

    let name = key
        .strip_prefix(chunk_prefix)
        .ok_or_else(|| corrupt(format!("outside chunk prefix {}", chunk_prefix)))?;
    let stem = name
        .strip_suffix(CHUNK_EXTENSION)
        .ok_or_else(|| corrupt(format!("missing {} extension", CHUNK_EXTENSION)))?;
    let (from, to) = stem
        .split_once(RANGE_SEPARATOR)
        .ok_or_else(|| corrupt("expected <from>_<to>".to_string()))?;

    let from = parse_instant(from).map_err(|e| corrupt(e.to_string()))?;
    let to = parse_instant(to).map_err(|e| corrupt(e.to_string()))?;
    TimeRange::new(from, to).map_err(|e| corrupt(e.to_string()))
}

pub fn encode_full_backup_key(
    prefix: &str,
    database: Option<&str>,
    created_at: Instant,
    gzip: bool,
) -> String {
    let ext = if gzip { GZIP_EXTENSION } else { ARCHIVE_EXTENSION };
    format!(
        "{}{}{}",
        full_backup_prefix(prefix, database),
        format_instant(created_at),
        ext
    )
}

/// Decode the creation instant of a full backup listed under `backup_prefix`.
pub fn decode_full_backup_key(backup_prefix: &str, key: &str) -> Result<Instant> {
    let corrupt = |reason: String| ChronologyError::CatalogCorruption {
        key: key.to_string(),
        reason,
    };

    let name = key
        .strip_prefix(backup_prefix)
        .ok_or_else(|| corrupt(format!("outside backup prefix {}", backup_prefix)))?;
    let stem = name
        .strip_suffix(GZIP_EXTENSION)
        .or_else(|| name.strip_suffix(ARCHIVE_EXTENSION))
        .ok_or_else(|| corrupt("unknown backup extension".to_string()))?;
    parse_instant(stem).map_err(|e| corrupt(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, ms: u32) -> Instant {
        Utc.with_ymd_and_hms(2024, 1, 1, h, m, 0).unwrap()
            + chrono::Duration::milliseconds(ms as i64)
    }

    #[test]
    fn layout_with_and_without_prefix() {
        assert_eq!(chunk_prefix(""), "oplog/");
        assert_eq!(chunk_prefix("/backups/"), "backups/oplog/");
        assert_eq!(cursor_key("backups"), "backups/oplog/oplog_config.json");
        assert_eq!(full_backup_prefix("backups", None), "backups/full_backups/");
        assert_eq!(
            full_backup_prefix("", Some("orders")),
            "orders_database_backups/"
        );
    }

    #[test]
    fn chunk_key_decodes_to_encoded_range() {
        let range = TimeRange::new(at(1, 0, 250), at(2, 30, 0)).unwrap();
        let key = encode_chunk_key("backups", &range);
        assert_eq!(
            key,
            "backups/oplog/2024-01-01T01:00:00.250+00:00_2024-01-01T02:30:00.000+00:00.tar.gz"
        );
        let decoded = decode_chunk_key(&chunk_prefix("backups"), &key).unwrap();
        assert_eq!(decoded, range);
        assert_eq!(encode_chunk_key("backups", &decoded), key);
    }

    #[test]
    fn sub_millisecond_precision_is_dropped() {
        let t = at(1, 0, 0) + chrono::Duration::nanoseconds(1_500_123);
        assert_eq!(truncate_millis(t), at(1, 0, 1));
        assert_eq!(format_instant(t), "2024-01-01T01:00:00.001+00:00");
    }

    #[test]
    fn malformed_chunk_keys_are_corruption() {
        let prefix = chunk_prefix("");
        for key in [
            "oplog/garbage.tgz",
            "oplog/2024-01-01T00_2024-01-02T00.tgz",
            "oplog/2024-01-01T01:00:00.000+00:00.tar.gz",
            "oplog/2024-01-01T02:00:00.000+00:00_2024-01-01T01:00:00.000+00:00.tar.gz",
            "oplog/2024-01-01T01:00:00.000+02:00_2024-01-01T02:00:00.000+02:00.tar.gz",
            "elsewhere/2024-01-01T01:00:00.000+00:00_2024-01-01T02:00:00.000+00:00.tar.gz",
        ] {
            let err = decode_chunk_key(&prefix, key).unwrap_err();
            match err {
                ChronologyError::CatalogCorruption { key: bad, .. } => assert_eq!(bad, key),
                other => panic!("unexpected error for {}: {:?}", key, other),
            }
        }
    }

    #[test]
    fn full_backup_keys_round_trip() {
        let created = at(3, 15, 42);
        let key = encode_full_backup_key("p", Some("orders"), created, true);
        assert_eq!(key, "p/orders_database_backups/2024-01-01T03:15:00.042+00:00.gzip");
        let prefix = full_backup_prefix("p", Some("orders"));
        assert_eq!(decode_full_backup_key(&prefix, &key).unwrap(), created);

        let plain = encode_full_backup_key("p", None, created, false);
        assert!(plain.ends_with(".archive"));
        assert!(decode_full_backup_key(&full_backup_prefix("p", None), "p/full_backups/x.zip").is_err());
    }

    #[test]
    fn keys_are_classified_by_backup_set() {
        assert_eq!(backup_set_of("p", "p/full_backups/x.gzip"), Some(None));
        assert_eq!(
            backup_set_of("p", "p/orders_database_backups/x.gzip"),
            Some(Some("orders".to_string()))
        );
        assert_eq!(
            backup_set_of("", "orders_database_backups/x.gzip"),
            Some(Some("orders".to_string()))
        );
        assert_eq!(backup_set_of("p", "p/oplog/oplog_config.json"), None);
        assert_eq!(backup_set_of("p", "p/_database_backups/x.gzip"), None);
        assert_eq!(backup_set_of("p", "q/full_backups/x.gzip"), None);
        assert_eq!(backup_set_of("p", "p/full_backups"), None);
    }

    #[test]
    fn human_instants_accept_both_forms() {
        let expected = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(parse_human_instant("2024-05-06 07:08:09").unwrap(), expected);
        assert_eq!(
            parse_human_instant("2024-05-06T09:08:09+02:00").unwrap(),
            expected
        );
        assert!(parse_human_instant("yesterday").is_err());
        assert_eq!(format_human_instant(expected), "2024-05-06 07:08:09 UTC");
    }
}
