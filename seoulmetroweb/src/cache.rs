use std::convert::Infallible;

use http_body_util::Full;
use hyper::{Request, Response};
use hyper::body::Bytes;
use serde::Serialize;
use tracing::{error, info};

use crate::{AppState, ensure_get, render_json, return_500};


#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitSuccessBody {
    pub success: bool,
    pub message: &'static str,
    pub record_count: usize,
    pub duplicates_dropped: usize,
}

#[derive(Clone, Debug, Serialize)]
struct InitFailureBody {
    pub success: bool,
    pub error: &'static str,
    pub details: String,
}


pub(crate) async fn handle_cache_init(state: &AppState, request: &Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(r) = ensure_get(request) {
        return r;
    }

    let rendered = match state.cache.initialize().await {
        Ok(summary) => {
            info!(record_count = summary.record_count, "cache initialized on request");
            let body = InitSuccessBody {
                success: true,
                message: "cache initialized",
                record_count: summary.record_count,
                duplicates_dropped: summary.duplicates_dropped,
            };
            render_json(&body, 200, vec![])
        },
        Err(e) => {
            error!(error = %e, "failed to initialize cache");
            let body = InitFailureBody {
                success: false,
                error: "failed to initialize cache",
                details: e.to_string(),
            };
            render_json(&body, 500, vec![])
        },
    };
    match rendered {
        Some(r) => Ok(r),
        None => return_500(),
    }
}

pub(crate) async fn handle_cache_status(state: &AppState, request: &Request<()>) -> Result<Response<Full<Bytes>>, Infallible> {
    if let Some(r) = ensure_get(request) {
        return r;
    }

    let status = state.cache.status().await;
    match render_json(&status, 200, vec![]) {
        Some(r) => Ok(r),
        None => return_500(),
    }
}
