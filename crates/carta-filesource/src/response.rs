use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use carta_net::HttpResponse;
use carta_store::ResponseMeta;

/// A loaded resource, from the network or from the cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub body: Bytes,
    pub meta: ResponseMeta,
    /// True when served from the cache/offline database.
    pub from_cache: bool,
    /// True when the cached copy has been invalidated and should be
    /// revalidated before long-term trust.
    pub stale: bool,
}

impl Response {
    /// Fresh network response with caching validators parsed out of the
    /// transport headers.
    pub fn from_http(http: HttpResponse) -> Self {
        let meta = parse_meta(&http);
        Self {
            body: http.body,
            meta,
            from_cache: false,
            stale: false,
        }
    }

    pub fn from_record(body: Vec<u8>, meta: ResponseMeta, stale: bool) -> Self {
        Self {
            body: Bytes::from(body),
            meta,
            from_cache: true,
            stale,
        }
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract `ETag` and `Cache-Control` (`max-age`, `must-revalidate`)
/// into persistable metadata. `max-age` is converted to an absolute
/// expiry so the stored value is self-contained.
fn parse_meta(http: &HttpResponse) -> ResponseMeta {
    let mut meta = ResponseMeta {
        etag: http.headers.get_ignore_case("etag").map(str::to_string),
        ..Default::default()
    };

    if let Some(cache_control) = http.headers.get_ignore_case("cache-control") {
        for directive in cache_control.split(',') {
            let directive = directive.trim();
            if directive.eq_ignore_ascii_case("must-revalidate") {
                meta.must_revalidate = true;
            } else if let Some(value) = directive
                .strip_prefix("max-age=")
                .or_else(|| directive.strip_prefix("Max-Age="))
            {
                if let Ok(secs) = value.trim().parse::<u64>() {
                    meta.expires = Some(unix_now().saturating_add(secs));
                }
            }
        }
    }

    meta
}
