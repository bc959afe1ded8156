use std::convert::Infallible;

use http_body_util::Full;
use hyper::{Request, Response};
use hyper::body::Bytes;
use seoulmetro_history::export::{export_file_name, RAW_EXPORT_FILE_NAME, records_to_csv};
use seoulmetro_history::model::HistoricalRecord;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::{
    AppState, ensure_get, get_query_pairs, get_query_param, render_csv_download, render_json,
    return_500, return_json_error,
};


const RAW_FILE_MISSING: &str = "historical data file not found";
const EXPORT_FAILED: &str = "failed to export historical data";


#[derive(Clone, Debug, Serialize)]
struct HistoricalRecordsBody<'a> {
    pub station: &'a str,
    pub line: &'a str,
    pub count: usize,
    pub records: Vec<HistoricalRecord>,
}


/// Serves the historical data as CSV.
///
/// With both `station` and `line`, the matching cached records are exported; otherwise, the raw
/// source file is returned as-is.
pub(crate) async fn handle_historical_export(state: &AppState, request: &Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(r) = ensure_get(request) {
        return r;
    }

    let query_pairs = get_query_pairs(request);
    let station = get_query_param(&query_pairs, "station");
    let line = get_query_param(&query_pairs, "line");
    match (station, line) {
        (Some(s), Some(l)) => export_filtered(state, s, l).await,
        _ => export_raw(state).await,
    }
}

async fn export_raw(state: &AppState) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = state.cache.source_path();
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read raw historical data file");
            return return_json_error(404, RAW_FILE_MISSING);
        },
    };
    let text = match String::from_utf8(bytes) {
        Ok(t) => t,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "raw historical data file is not UTF-8");
            return return_json_error(404, RAW_FILE_MISSING);
        },
    };

    match render_csv_download(text, RAW_EXPORT_FILE_NAME) {
        Some(r) => Ok(r),
        None => return_json_error(500, EXPORT_FAILED),
    }
}

async fn export_filtered(state: &AppState, station: &str, line: &str) -> Result<Response<Full<Bytes>>, Infallible> {
    let records = state.cache.query(station, line).await;
    debug!(station, line, count = records.len(), "exporting historical records");

    let document = match records_to_csv(&records) {
        Ok(d) => d,
        Err(e) => {
            error!(station, line, error = %e, "failed to export historical records");
            return return_json_error(500, EXPORT_FAILED);
        },
    };

    match render_csv_download(document, &export_file_name(station, line)) {
        Some(r) => Ok(r),
        None => {
            error!(station, line, "failed to assemble historical export response");
            return_json_error(500, EXPORT_FAILED)
        },
    }
}


/// Returns the cached records of a station on a line as JSON.
pub(crate) async fn handle_historical_records(state: &AppState, request: &Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(r) = ensure_get(request) {
        return r;
    }

    let query_pairs = get_query_pairs(request);
    let (station, line) = match (get_query_param(&query_pairs, "station"), get_query_param(&query_pairs, "line")) {
        (Some(s), Some(l)) => (s, l),
        _ => return return_json_error(400, "both station and line are required"),
    };

    let records = state.cache.query(station, line).await;
    let body = HistoricalRecordsBody {
        station,
        line,
        count: records.len(),
        records,
    };
    match render_json(&body, 200, vec![]) {
        Some(r) => Ok(r),
        None => return_500(),
    }
}
