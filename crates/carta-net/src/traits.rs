use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use crate::{error::NetError, types::Headers};

/// A completed HTTP exchange: status, response headers, body bytes.
///
/// Cache layers read validators (`ETag`, `Cache-Control`, `Expires`)
/// out of `headers`; the transport does not interpret them.
#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

/// The injected transport capability.
///
/// One operation is enough for this subsystem: resources are whole small
/// objects, fetched in one exchange. Implementations must not retry;
/// classification of the failure is the caller's signal.
#[cfg_attr(any(test, feature = "mock"), unimock::unimock(api = NetMock))]
#[async_trait]
pub trait Net: Send + Sync {
    /// Fetch all bytes from a URL.
    async fn fetch(&self, url: Url, headers: Option<Headers>) -> Result<HttpResponse, NetError>;
}
