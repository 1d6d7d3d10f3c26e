//! Multi-style pagination
//!
//! [`RequestClient::paginate`] walks pages lazily and yields one record at a
//! time. How records and the next-page link are found in a page is decided by
//! a [`PageExtractor`]; the defaults cover the common shapes:
//!
//! - Records: a bare array, or an array under `data`, `results` or `items`
//! - Next page: `next`, `nextLink` or `@odata.nextLink` in the body, else a
//!   `Link: <...>; rel="next"` response header
//!
//! A walk stops after `max_pages` pages even if a next link is still present.

use crate::error::Result;
use crate::request_client::{parse_json, RequestClient, RequestOptions};
use bridge_traits::http::{HttpMethod, HttpResponse};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

/// Hard cap on pages fetched by a single walk.
pub const DEFAULT_MAX_PAGES: usize = 100;

static LINK_NEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<([^>]+)>;\s*rel="next""#).expect("LINK_NEXT is a valid regex pattern")
});

const RECORD_ENVELOPES: [&str; 3] = ["data", "results", "items"];
const NEXT_LINK_FIELDS: [&str; 3] = ["next", "nextLink", "@odata.nextLink"];

/// Per-provider page shape
pub trait PageExtractor: Send + Sync {
    fn records(&self, body: &Value) -> Vec<Value> {
        default_records(body)
    }

    fn next_page(&self, body: &Value, response: &HttpResponse) -> Option<String> {
        default_next_page(body, response)
    }
}

/// Uses the built-in record and next-link lookups.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPageExtractor;

impl PageExtractor for DefaultPageExtractor {}

pub fn default_records(body: &Value) -> Vec<Value> {
    if let Value::Array(items) = body {
        return items.clone();
    }

    RECORD_ENVELOPES
        .iter()
        .find_map(|key| body.get(*key).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

pub fn default_next_page(body: &Value, response: &HttpResponse) -> Option<String> {
    if body.is_object() {
        if let Some(next) = NEXT_LINK_FIELDS
            .iter()
            .find_map(|key| body.get(*key).and_then(Value::as_str))
            .filter(|link| !link.is_empty())
        {
            return Some(next.to_string());
        }
    }

    link_header_next(response)
}

/// Target of the `rel="next"` entry of an RFC 5988 `Link` header.
pub fn link_header_next(response: &HttpResponse) -> Option<String> {
    let header = response.header("Link")?;
    LINK_NEXT
        .captures(header)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

struct PageCursor<'a> {
    next: Option<String>,
    options: RequestOptions,
    extractor: &'a dyn PageExtractor,
    pages: usize,
    records: usize,
}

impl RequestClient {
    /// Lazily yield every record reachable from `path`.
    ///
    /// Query parameters in `options` apply to the first page only; headers are
    /// sent with every page. A request or parse failure ends the stream with
    /// that error.
    pub fn paginate<'a>(
        &'a self,
        path: &str,
        options: RequestOptions,
        extractor: &'a dyn PageExtractor,
    ) -> BoxStream<'a, Result<Value>> {
        let cursor = PageCursor {
            next: Some(path.to_string()),
            options,
            extractor,
            pages: 0,
            records: 0,
        };

        stream::try_unfold(cursor, move |cursor| self.fetch_page(cursor))
            .map_ok(|records| stream::iter(records.into_iter().map(Ok)))
            .try_flatten()
            .boxed()
    }

    async fn fetch_page<'a>(
        &'a self,
        mut cursor: PageCursor<'a>,
    ) -> Result<Option<(Vec<Value>, PageCursor<'a>)>> {
        let Some(url) = cursor.next.take() else {
            info!(
                source = %self.source_name(),
                pages = cursor.pages,
                records = cursor.records,
                "Pagination complete"
            );
            return Ok(None);
        };

        if cursor.pages >= self.max_pages {
            warn!(
                source = %self.source_name(),
                max_pages = self.max_pages,
                "Page limit reached, stopping pagination"
            );
            return Ok(None);
        }

        let options = if cursor.pages == 0 {
            cursor.options.clone()
        } else {
            cursor.options.without_query()
        };
        let response = self.execute(HttpMethod::Get, &url, options).await?;
        let body: Value = parse_json(&response)?;

        let records = cursor.extractor.records(&body);
        cursor.next = cursor.extractor.next_page(&body, &response);
        cursor.pages += 1;
        cursor.records += records.len();

        debug!(page = cursor.pages, count = records.len(), "Fetched page");
        Ok(Some((records, cursor)))
    }

    /// Collect every record from [`paginate`](Self::paginate).
    pub async fn collect_pages(
        &self,
        path: &str,
        options: RequestOptions,
        extractor: &dyn PageExtractor,
    ) -> Result<Vec<Value>> {
        self.paginate(path, options, extractor).try_collect().await
    }
}
