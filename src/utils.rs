use chrono::{DateTime, Local};
use std::fs::DirBuilder;
use std::path::Path;

/// Format used for every stored chat timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Creates a directory if it doesn't exist
pub fn ensure_dir(path: impl AsRef<Path>) -> std::io::Result<()> {
    DirBuilder::new().recursive(true).create(path)
}

/// Current local time as `YYYY-MM-DD HH:MM:SS`
pub fn now_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Renders fractional epoch seconds in local time, `None` when out of range.
pub fn format_epoch_seconds(seconds: f64) -> Option<String> {
    if !seconds.is_finite() {
        return None;
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9) as u32;
    let utc = DateTime::from_timestamp(whole as i64, nanos)?;
    Some(
        utc.with_timezone(&Local)
            .format(TIMESTAMP_FORMAT)
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use tempfile::tempdir;

    #[test]
    fn test_now_timestamp_format() {
        let now = now_timestamp();
        assert_eq!(now.len(), 19);
        assert!(NaiveDateTime::parse_from_str(&now, TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn test_format_epoch_seconds() {
        let rendered = format_epoch_seconds(1_700_000_000.25).unwrap();
        assert!(NaiveDateTime::parse_from_str(&rendered, TIMESTAMP_FORMAT).is_ok());
        assert!(format_epoch_seconds(f64::NAN).is_none());
    }

    #[test]
    fn test_ensure_dir_nested() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let nested = dir.path().join("a").join("b");
        ensure_dir(&nested)?;
        assert!(nested.is_dir());
        ensure_dir(&nested)?;
        Ok(())
    }
}
