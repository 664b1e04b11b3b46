//! Query command implementation.

use crate::app::App;
use crate::OutputFormat;
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use journal_core::types::{FILESIZE, MIME_TYPE, PREVIEW};
use journal_core::{model, Config, Entry, Query, SortKey};
use std::time::Instant;

/// Filters and window taken from the command line
#[derive(Debug, Default)]
pub struct QueryOptions {
    pub mount_point: String,
    pub text: Option<String>,
    pub mime_types: Vec<String>,
    pub favorites: bool,
    pub activity: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
    pub order_by: Vec<String>,
    pub page_size: usize,
    pub limit: usize,
    pub offset: usize,
}

impl QueryOptions {
    fn to_query(&self) -> anyhow::Result<Query> {
        let mut query = Query::new().mount_point(self.mount_point.as_str());

        if let Some(text) = &self.text {
            query = query.text(text.as_str());
        }
        if !self.mime_types.is_empty() {
            query = query.mime_types(self.mime_types.iter().cloned());
        }
        if self.favorites {
            query = query.favorites();
        }
        if let Some(activity) = &self.activity {
            query = query.activity(activity.as_str());
        }

        let since = self.since.as_deref().map(parse_time).transpose()?;
        let until = self.until.as_deref().map(parse_time).transpose()?;
        if since.is_some() || until.is_some() {
            query = query.between(since, until);
        }

        for key in &self.order_by {
            let key: SortKey = key
                .parse()
                .with_context(|| format!("Invalid sort key: {}", key))?;
            query = query.order_by(key);
        }

        Ok(query)
    }
}

/// Parse a point in time as epoch seconds, a date or an RFC 3339 timestamp.
fn parse_time(s: &str) -> anyhow::Result<i64> {
    let s = s.trim();
    if let Ok(seconds) = s.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&midnight).timestamp());
        }
    }
    match DateTime::parse_from_rfc3339(s) {
        Ok(time) => Ok(time.timestamp()),
        Err(_) => bail!("Unrecognized time: {} (expected YYYY-MM-DD, RFC 3339 or epoch seconds)", s),
    }
}

/// Read entries `offset..offset + limit` of the query's result set.
fn collect(app: &App, options: &QueryOptions) -> anyhow::Result<(usize, Vec<Entry>)> {
    let query = options.to_query()?;
    let mut results = model::find(&app.ctx, &query, options.page_size)?;
    results.setup()?;
    results.run_until_ready();

    let total = results.get_length()?;
    let end = total.min(options.offset.saturating_add(options.limit));

    let mut entries = Vec::with_capacity(end.saturating_sub(options.offset));
    for position in options.offset..end {
        results.seek(position);
        let mut entry = results.read()?.clone();
        entry.remove(PREVIEW);
        entries.push(entry);
    }

    results.stop();
    Ok((total, entries))
}

fn format_time(timestamp: Option<i64>) -> String {
    timestamp
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Run the query command.
pub fn run(config: Config, options: QueryOptions, output: OutputFormat) -> anyhow::Result<()> {
    let app = App::new(config)?;
    let start = Instant::now();
    let (total, entries) = collect(&app, &options)?;
    let elapsed = start.elapsed();

    match output {
        OutputFormat::Text => {
            for (i, entry) in entries.iter().enumerate() {
                println!(
                    "{:>5}  {}  {:>10}  {:<24}  {}",
                    options.offset + i,
                    format_time(entry.timestamp()),
                    entry
                        .get_i64(FILESIZE)
                        .map_or_else(|| "-".to_string(), |s| s.to_string()),
                    entry.get_str(MIME_TYPE).unwrap_or("-"),
                    entry.title().unwrap_or("Untitled"),
                );
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
    }

    eprintln!(
        "\nShowing {} of {} entries ({:.2}ms)",
        entries.len(),
        total,
        elapsed.as_secs_f64() * 1000.0
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn test_config() -> Config {
        let mut config = Config::default();
        // TempDir lives under /tmp, which would otherwise look like a share
        config.remote.mount_root = "/net/shares/".to_string();
        config
    }

    #[test]
    fn test_parse_time() {
        assert_eq!(parse_time("86400").unwrap(), 86400);
        assert_eq!(parse_time("1970-01-02").unwrap(), 86400);
        assert_eq!(parse_time("1970-01-01T01:00:00+01:00").unwrap(), 0);
        assert!(parse_time("yesterday").is_err());
    }

    #[test]
    fn test_bad_sort_key() {
        let options = QueryOptions {
            mount_point: "/media/usb".to_string(),
            order_by: vec!["-".to_string()],
            ..QueryOptions::default()
        };
        assert!(options.to_query().is_err());
    }

    #[test]
    fn test_query_directory() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("moon.txt"), "a").unwrap();
        fs::write(temp_dir.path().join("sun.txt"), "bbb").unwrap();
        fs::write(temp_dir.path().join("moon.png"), "cc").unwrap();

        let app = App::new(test_config()).unwrap();
        let options = QueryOptions {
            mount_point: temp_dir.path().to_string_lossy().into_owned(),
            text: Some("moon".to_string()),
            order_by: vec!["+filesize".to_string()],
            page_size: 2,
            limit: 10,
            ..QueryOptions::default()
        };

        let (total, entries) = collect(&app, &options).unwrap();
        assert_eq!(total, 2);
        let sizes: Vec<_> = entries.iter().map(|e| e.get_i64(FILESIZE)).collect();
        assert_eq!(sizes, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_query_window() {
        let temp_dir = TempDir::new().unwrap();
        for i in 0..7 {
            fs::write(temp_dir.path().join(format!("f{}.txt", i)), "x".repeat(i + 1)).unwrap();
        }

        let app = App::new(test_config()).unwrap();
        let options = QueryOptions {
            mount_point: temp_dir.path().to_string_lossy().into_owned(),
            order_by: vec!["-filesize".to_string()],
            page_size: 2,
            limit: 3,
            offset: 5,
            ..QueryOptions::default()
        };

        let (total, entries) = collect(&app, &options).unwrap();
        assert_eq!(total, 7);
        let sizes: Vec<_> = entries.iter().map(|e| e.get_i64(FILESIZE)).collect();
        assert_eq!(sizes, vec![Some(2), Some(1)]);
    }

    #[test]
    fn test_object_store_needs_store() {
        let app = App::new(test_config()).unwrap();
        let options = QueryOptions {
            mount_point: "/".to_string(),
            page_size: 10,
            limit: 10,
            ..QueryOptions::default()
        };
        assert!(collect(&app, &options).is_err());
    }
}
