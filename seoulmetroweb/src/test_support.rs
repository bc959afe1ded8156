use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use http_body_util::{BodyExt, Full};
use hyper::Response;
use hyper::body::Bytes;
use seoulmetro_history::cache::HistoryCache;
use seoulmetro_history::model::HistoricalRecord;
use seoulmetro_history::source::SourceOptions;

use crate::AppState;


static FIXTURE_COUNTER: AtomicUsize = AtomicUsize::new(0);


/// A unique path in the temporary directory, containing `contents` or (if `None`) nothing.
pub(crate) fn fixture_path(contents: Option<&str>) -> PathBuf {
    let n = FIXTURE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let path = std::env::temp_dir()
        .join(format!("seoulmetroweb_{}_{}.csv", std::process::id(), n));
    match contents {
        Some(c) => std::fs::write(&path, c).unwrap(),
        None => { let _ = std::fs::remove_file(&path); },
    }
    path
}

pub(crate) fn empty_state() -> AppState {
    AppState::new(HistoryCache::new(fixture_path(None), SourceOptions::default()))
}

pub(crate) fn state_with_source(contents: Option<&str>) -> (AppState, PathBuf) {
    let path = fixture_path(contents);
    let state = AppState::new(HistoryCache::new(path.clone(), SourceOptions::default()));
    (state, path)
}

pub(crate) fn state_with_records(source: Option<&str>, records: Vec<HistoricalRecord>) -> AppState {
    let cache = HistoryCache::from_records(fixture_path(source), SourceOptions::default(), records);
    AppState::new(cache)
}

pub(crate) async fn body_string(response: Response<Full<Bytes>>) -> String {
    let bytes = response.into_body()
        .collect().await
        .unwrap()
        .to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
