//! API route handlers

pub mod health;
pub mod reports;
pub mod schema;
pub mod values;

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::http::{HeaderMap, header};

use crate::core::constants::DEFAULT_QUERY_CONTEXT;
use crate::domain::reports::{DimensionValuesService, ReportService};

/// State shared by the authenticated report and schema routes
#[derive(Clone)]
pub struct ReportsApiState {
    pub reports: Arc<ReportService>,
    pub values: Arc<DimensionValuesService>,
    /// Request host to backend application tag
    pub contexts: Arc<BTreeMap<String, String>>,
}

/// Application tag for a request: the host of its Origin (or Referer)
/// header, mapped through `contexts`. No usable header means `direct`.
pub fn request_context(headers: &HeaderMap, contexts: &BTreeMap<String, String>) -> String {
    let host = [header::ORIGIN, header::REFERER]
        .iter()
        .filter_map(|name| headers.get(name)?.to_str().ok())
        .map(str::trim)
        .find(|v| !v.is_empty() && *v != "null")
        .map(origin_host)
        .unwrap_or_default();

    if let Some(tag) = contexts.get(&host) {
        return tag.clone();
    }
    if host.is_empty() {
        DEFAULT_QUERY_CONTEXT.to_string()
    } else {
        host
    }
}

fn origin_host(origin: &str) -> String {
    match reqwest::Url::parse(origin) {
        Ok(url) => match (url.host_str(), url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => String::new(),
        },
        Err(_) => origin
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}
