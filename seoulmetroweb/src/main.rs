mod cache;
mod config;
mod errors;
mod historical;
#[cfg(test)]
mod test_support;


use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

use http_body_util::Full;
use hyper::{Method, Request, Response};
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use seoulmetro_history::cache::HistoryCache;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cache::{handle_cache_init, handle_cache_status};
use crate::config::load_config;
use crate::errors::GeneralError;
use crate::historical::{handle_historical_export, handle_historical_records};


const FILE_NAME_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');


pub(crate) struct AppState {
    pub cache: HistoryCache,
}
impl AppState {
    pub fn new(cache: HistoryCache) -> Self {
        Self {
            cache,
        }
    }
}


#[derive(Clone, Debug, Serialize)]
struct ErrorBody<'a> {
    pub error: &'a str,
}


pub(crate) fn get_query_pairs<T>(request: &Request<T>) -> HashMap<Cow<str>, Cow<str>> {
    if let Some(q) = request.uri().query() {
        form_urlencoded::parse(q.as_bytes())
            .collect()
    } else {
        HashMap::new()
    }
}

/// Returns the value of a query parameter, treating an empty value as absent.
pub(crate) fn get_query_param<'a>(query_pairs: &'a HashMap<Cow<'_, str>, Cow<'_, str>>, key: &str) -> Option<&'a str> {
    query_pairs.get(key)
        .map(|v| &**v)
        .filter(|v| v.len() > 0)
}


fn build_response(status: u16, content_type: &str, headers: Vec<(String, String)>, body: Bytes) -> Option<Response<Full<Bytes>>> {
    let mut builder = Response::builder()
        .status(status)
        .header("Content-Type", content_type);
    for (k, v) in &headers {
        builder = builder.header(k, v);
    }
    match builder.body(Full::new(body)) {
        Ok(r) => Some(r),
        Err(e) => {
            error!("failed to assemble response: {}", e);
            None
        },
    }
}

pub(crate) fn render_json<S: Serialize>(value: &S, status: u16, headers: Vec<(String, String)>) -> Option<Response<Full<Bytes>>> {
    let rendered = match serde_json::to_string_pretty(value) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to render JSON: {}", e);
            return None;
        },
    };
    build_response(status, "application/json", headers, Bytes::from(rendered))
}

/// Responds with a CSV document offered for download under the given file name.
pub(crate) fn render_csv_download(body: String, file_name: &str) -> Option<Response<Full<Bytes>>> {
    let headers = vec![
        ("Content-Disposition".to_owned(), content_disposition(file_name)),
    ];
    build_response(200, "text/csv; charset=utf-8", headers, Bytes::from(body))
}

fn content_disposition(file_name: &str) -> String {
    let ascii_name: String = file_name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if ascii_name == file_name {
        format!("attachment; filename=\"{}\"", file_name)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            ascii_name, utf8_percent_encode(file_name, FILE_NAME_SAFE),
        )
    }
}


pub(crate) fn return_json_error(status: u16, message: &str) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = ErrorBody {
        error: message,
    };
    match render_json(&body, status, vec![]) {
        Some(r) => Ok(r),
        None => return_500(),
    }
}

pub(crate) fn return_404() -> Result<Response<Full<Bytes>>, Infallible> {
    return_json_error(404, "not found")
}

pub(crate) fn return_405() -> Result<Response<Full<Bytes>>, Infallible> {
    let body = ErrorBody {
        error: "method not allowed",
    };
    let headers = vec![
        ("Allow".to_owned(), "GET".to_owned()),
    ];
    match render_json(&body, 405, headers) {
        Some(r) => Ok(r),
        None => return_500(),
    }
}

pub(crate) fn return_500() -> Result<Response<Full<Bytes>>, Infallible> {
    let response_res = Response::builder()
        .status(500)
        .header("Content-Type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from("500 Internal Server Error")));
    match response_res {
        Err(e) => panic!("failed to construct 500 response: {}", e),
        Ok(b) => Ok(b),
    }
}


pub(crate) fn ensure_get(request: &Request<()>) -> Option<Result<Response<Full<Bytes>>, Infallible>> {
    if request.method() == Method::GET {
        None
    } else {
        Some(return_405())
    }
}


async fn handle_request<B>(state: &AppState, request: Request<B>) -> Result<Response<Full<Bytes>>, Infallible> {
    // none of the endpoints read a request body
    let (parts, _) = request.into_parts();
    let request = Request::from_parts(parts, ());

    let span = info_span!("request", method = %request.method(), path = %request.uri().path());
    async {
        let response = match request.uri().path() {
            "/api/cache/init" => handle_cache_init(state, &request).await,
            "/api/cache/status" => handle_cache_status(state, &request).await,
            "/api/data/historical_utf8" => handle_historical_export(state, &request).await,
            "/api/data/historical" => handle_historical_records(state, &request).await,
            _ => return_404(),
        };
        if let Ok(r) = &response {
            debug!(status = r.status().as_u16(), "request handled");
        }
        response
    }.instrument(span).await
}


async fn run() -> Result<(), GeneralError> {
    // set up tracing
    let (stderr_non_blocking, _guard) = tracing_appender::non_blocking::NonBlockingBuilder::default()
        .lossy(false)
        .finish(std::io::stderr());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(stderr_non_blocking)
        .init();

    // get config path and load config
    let args_os: Vec<OsString> = std::env::args_os().collect();
    let config_path = match args_os.get(1) {
        Some(cp) => PathBuf::from(cp),
        None => PathBuf::from("webconfig.toml"),
    };
    let config = load_config(&config_path)?;

    let cache = HistoryCache::new(config.source_path.clone(), config.source_options());
    let state = Arc::new(AppState::new(cache));

    if config.preload_cache {
        if let Err(e) = state.cache.initialize().await {
            // the cache can still be initialized later through the endpoint
            warn!(error = %e, "failed to preload historical ridership cache");
        }
    }

    let listener = TcpListener::bind(config.listen).await
        .map_err(GeneralError::Listening)?;
    info!(listen = %config.listen, "listening for connections");

    loop {
        let (stream, remote_addr) = match listener.accept().await {
            Ok(sa) => sa,
            Err(e) => {
                error!("failed to accept connection: {}", e);
                continue;
            },
        };
        let io = TokioIo::new(stream);
        let connection_state = Arc::clone(&state);

        tokio::spawn(async move {
            let service = service_fn(move |request: Request<Incoming>| {
                let request_state = Arc::clone(&connection_state);
                async move {
                    handle_request(&request_state, request).await
                }
            });
            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%remote_addr, "connection error: {}", e);
            }
        });
    }
}

fn main() {
    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
        .block_on(async {
            run().await
        });

    std::process::exit(
        match result {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("{}", e);
                1
            },
        }
    )
}
