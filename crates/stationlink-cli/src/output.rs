//! Output file naming
//!
//! The weather station appends to one fixed file. The nozzle controller gets
//! a file per day; when that name is taken a letter is appended, using the
//! first free one.

use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use stationlink_core::acquisition::Protocol;

/// Fixed weather station output file
pub const WEATHER_FILE: &str = "WeatherStation.m";

const NOZZLE_PREFIX: &str = "WEEDIT-DATA-";
const EXTENSION: &str = "m";

/// Where `protocol` writes its records for a run started on `today`
pub fn output_path(dir: &Path, protocol: Protocol, today: NaiveDate) -> PathBuf {
    match protocol {
        Protocol::Weather => dir.join(WEATHER_FILE),
        Protocol::Nozzle => nozzle_path(dir, today),
    }
}

fn nozzle_path(dir: &Path, today: NaiveDate) -> PathBuf {
    let stem = format!("{}{}", NOZZLE_PREFIX, today.format("%Y-%m-%d"));
    let plain = dir.join(format!("{}.{}", stem, EXTENSION));
    if !plain.exists() {
        return plain;
    }

    let mut last = plain;
    for suffix in 'a'..='z' {
        let candidate = dir.join(format!("{}{}.{}", stem, suffix, EXTENSION));
        if !candidate.exists() {
            return candidate;
        }
        last = candidate;
    }
    tracing::warn!(
        "all output names for {} are taken, appending to {}",
        today,
        last.display()
    );
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2017, 2, 22).unwrap()
    }

    #[test]
    fn test_weather_file_is_fixed() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(WEATHER_FILE), "1;2;3;4;5;6\r\n").unwrap();
        assert_eq!(
            output_path(dir.path(), Protocol::Weather, day()),
            dir.path().join("WeatherStation.m")
        );
    }

    #[test]
    fn test_first_free_suffix() {
        let dir = tempdir().unwrap();
        let path = |name: &str| dir.path().join(name);

        assert_eq!(
            output_path(dir.path(), Protocol::Nozzle, day()),
            path("WEEDIT-DATA-2017-02-22.m")
        );

        fs::write(path("WEEDIT-DATA-2017-02-22.m"), "").unwrap();
        fs::write(path("WEEDIT-DATA-2017-02-22a.m"), "").unwrap();
        fs::write(path("WEEDIT-DATA-2017-02-22c.m"), "").unwrap();
        assert_eq!(
            output_path(dir.path(), Protocol::Nozzle, day()),
            path("WEEDIT-DATA-2017-02-22b.m")
        );
    }

    #[test]
    fn test_all_suffixes_taken() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("WEEDIT-DATA-2017-02-22.m"), "").unwrap();
        for suffix in 'a'..='z' {
            let name = format!("WEEDIT-DATA-2017-02-22{}.m", suffix);
            fs::write(dir.path().join(name), "").unwrap();
        }
        assert_eq!(
            output_path(dir.path(), Protocol::Nozzle, day()),
            dir.path().join("WEEDIT-DATA-2017-02-22z.m")
        );
    }
}
