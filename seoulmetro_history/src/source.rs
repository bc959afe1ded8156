//! Parsing of the raw ridership CSV into [`HistoricalRecord`]s.


use std::collections::HashSet;
use std::error;
use std::fmt;
use std::io::Read;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::model::{CongestionLevel, CongestionThresholds, HistoricalRecord, UnknownCongestionLevel};


/// Seoul is at UTC+09:00 and does not observe daylight saving time.
pub const KST_OFFSET_MINUTES: i32 = 9 * 60;


#[derive(Debug, Deserialize)]
struct SourceRow {
    #[serde(rename = "date", alias = "사용일자")] date: String,
    #[serde(rename = "line", alias = "노선명", alias = "호선명")] line: String,
    #[serde(rename = "station_name", alias = "역명")] station_name: String,
    #[serde(rename = "station_id", alias = "역번호")] station_id: String,
    #[serde(rename = "hour", alias = "시간대", default)] hour: Option<String>,
    #[serde(rename = "passenger_count", alias = "승객수")] passenger_count: String,
    #[serde(rename = "congestion_level", alias = "혼잡도", default)] congestion_level: Option<String>,
}


#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SourceOptions {
    pub utc_offset_minutes: i32,
    pub thresholds: CongestionThresholds,
}
impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            utc_offset_minutes: KST_OFFSET_MINUTES,
            thresholds: CongestionThresholds::default(),
        }
    }
}


#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LoadedRecords {
    pub records: Vec<HistoricalRecord>,
    pub duplicates_dropped: usize,
}


#[derive(Debug)]
pub enum SourceError {
    Csv(csv::Error),
    InvalidOffset(i32),
    InvalidDate { record: usize, value: String },
    InvalidHour { record: usize, value: String },
    InvalidPassengerCount { record: usize, value: String },
    InvalidCongestionLevel { record: usize, inner: UnknownCongestionLevel },
    AmbiguousTimestamp { record: usize },
}
impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Csv(e)
                => write!(f, "malformed CSV: {}", e),
            SourceError::InvalidOffset(minutes)
                => write!(f, "invalid UTC offset of {} minutes", minutes),
            SourceError::InvalidDate { record, value }
                => write!(f, "record {}: invalid date {:?}", record, value),
            SourceError::InvalidHour { record, value }
                => write!(f, "record {}: invalid hour {:?}", record, value),
            SourceError::InvalidPassengerCount { record, value }
                => write!(f, "record {}: invalid passenger count {:?}", record, value),
            SourceError::InvalidCongestionLevel { record, inner }
                => write!(f, "record {}: {}", record, inner),
            SourceError::AmbiguousTimestamp { record }
                => write!(f, "record {}: timestamp cannot be resolved", record),
        }
    }
}
impl error::Error for SourceError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            SourceError::Csv(e) => Some(e),
            SourceError::InvalidCongestionLevel { inner, .. } => Some(inner),
            _ => None,
        }
    }
}
impl From<csv::Error> for SourceError {
    fn from(e: csv::Error) -> Self {
        SourceError::Csv(e)
    }
}


fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref()
        .map(|v| v.trim())
        .filter(|v| v.len() > 0)
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
        .or_else(|| NaiveDate::parse_from_str(value, "%Y%m%d").ok())
}

fn row_to_record(row: SourceRow, record: usize, offset: &FixedOffset, options: &SourceOptions) -> Result<HistoricalRecord, SourceError> {
    let date = parse_date(row.date.trim())
        .ok_or_else(|| SourceError::InvalidDate { record, value: row.date.clone() })?;

    let hour: u32 = match non_empty(&row.hour) {
        Some(h) => h.parse::<u32>().ok()
            .filter(|h| *h < 24)
            .ok_or_else(|| SourceError::InvalidHour { record, value: h.to_owned() })?,
        None => 0,
    };

    let local = date.and_hms_opt(hour, 0, 0)
        .ok_or_else(|| SourceError::InvalidHour { record, value: hour.to_string() })?;
    let timestamp: DateTime<Utc> = offset.from_local_datetime(&local)
        .single()
        .ok_or(SourceError::AmbiguousTimestamp { record })?
        .with_timezone(&Utc);

    let passenger_count_str = row.passenger_count.trim();
    let passenger_count: u64 = passenger_count_str.parse()
        .map_err(|_| SourceError::InvalidPassengerCount { record, value: passenger_count_str.to_owned() })?;

    let congestion_level = match non_empty(&row.congestion_level) {
        Some(level) => level.parse::<CongestionLevel>()
            .map_err(|inner| SourceError::InvalidCongestionLevel { record, inner })?,
        None => options.thresholds.classify(passenger_count),
    };

    Ok(HistoricalRecord::new(
        timestamp,
        row.station_id.trim().to_owned(),
        row.station_name.trim().to_owned(),
        row.line.trim().to_owned(),
        passenger_count,
        congestion_level,
    ))
}


/// Parses every record of a ridership CSV.
///
/// Fails on the first malformed record; nothing is returned in that case. Records whose
/// (station, line, timestamp) was already seen are dropped and counted.
pub fn parse_records<R: Read>(reader: R, options: &SourceOptions) -> Result<LoadedRecords, SourceError> {
    let offset = FixedOffset::east_opt(options.utc_offset_minutes * 60)
        .ok_or(SourceError::InvalidOffset(options.utc_offset_minutes))?;

    let mut decoder = csv::ReaderBuilder::new()
        .delimiter(b',')
        .quote(b'"')
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates_dropped = 0;
    for (index, row_res) in decoder.deserialize().enumerate() {
        let row: SourceRow = row_res?;
        let record = row_to_record(row, index + 1, &offset, options)?;

        let identity = (record.station_id.clone(), record.line_num.clone(), record.timestamp);
        if !seen.insert(identity) {
            duplicates_dropped += 1;
            continue;
        }
        records.push(record);
    }

    if duplicates_dropped > 0 {
        warn!(duplicates_dropped, "dropped duplicate ridership observations");
    }

    Ok(LoadedRecords {
        records,
        duplicates_dropped,
    })
}
