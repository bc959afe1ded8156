use std::error;
use std::fmt;
use std::string::FromUtf8Error;

use crate::model::{format_timestamp, HistoricalRecord};


pub const EXPORT_HEADER: [&str; 6] = [
    "timestamp", "stationId", "stationName", "lineNum", "passengerCount", "congestionLevel",
];
pub const RAW_EXPORT_FILE_NAME: &str = "historical_utf8.csv";


#[derive(Debug)]
pub enum ExportError {
    Csv(csv::Error),
    Flush(String),
    Utf8(FromUtf8Error),
}
impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::Csv(e)
                => write!(f, "failed to write CSV record: {}", e),
            ExportError::Flush(e)
                => write!(f, "failed to finish CSV document: {}", e),
            ExportError::Utf8(e)
                => write!(f, "CSV document is not valid UTF-8: {}", e),
        }
    }
}
impl error::Error for ExportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ExportError::Csv(e) => Some(e),
            ExportError::Utf8(e) => Some(e),
            ExportError::Flush(_) => None,
        }
    }
}
impl From<csv::Error> for ExportError {
    fn from(e: csv::Error) -> Self {
        ExportError::Csv(e)
    }
}


/// Renders records as a CSV document with the fixed export header.
///
/// Lines are separated by `\n`, without a trailing line break. Fields are quoted only when
/// they contain a delimiter, quote or line break.
pub fn records_to_csv(records: &[HistoricalRecord]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b',')
        .quote_style(csv::QuoteStyle::Necessary)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(&EXPORT_HEADER)?;
    for record in records {
        let passenger_count = record.passenger_count.to_string();
        writer.write_record(&[
            format_timestamp(&record.timestamp).as_str(),
            record.station_id.as_str(),
            record.station_name.as_str(),
            record.line_num.as_str(),
            passenger_count.as_str(),
            record.congestion_level.label(),
        ])?;
    }

    let bytes = writer.into_inner()
        .map_err(|e| ExportError::Flush(e.error().to_string()))?;
    let mut text = String::from_utf8(bytes)
        .map_err(ExportError::Utf8)?;
    if text.ends_with('\n') {
        text.pop();
    }
    Ok(text)
}


/// The download name of a filtered export.
pub fn export_file_name(station_id: &str, line_num: &str) -> String {
    format!("historical_{}_{}.csv", station_id, line_num)
}
