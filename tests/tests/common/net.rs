use std::{
    collections::HashMap,
    sync::Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;
use carta_net::{Headers, HttpResponse, Net, NetError};
use url::Url;

/// In-memory transport: serves canned bodies by exact URL and records
/// every fetch it sees.
#[derive(Default)]
pub struct MapNet {
    responses: Mutex<HashMap<String, Bytes>>,
    seen: Mutex<Vec<Url>>,
}

impl MapNet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn seen(&self) -> Vec<Url> {
        self.seen.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

#[async_trait]
impl Net for MapNet {
    async fn fetch(&self, url: Url, _headers: Option<Headers>) -> Result<HttpResponse, NetError> {
        self.seen.lock().unwrap().push(url.clone());

        let body = self.responses.lock().unwrap().get(url.as_str()).cloned();
        match body {
            Some(body) => Ok(HttpResponse {
                status: 200,
                headers: Headers::new(),
                body,
            }),
            None => Err(NetError::HttpStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}
