use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{FileSourceError, FileSourceResult},
    response::Response,
};

/// Handle for one in-flight resource request.
///
/// Dropping the handle cancels the request. Both [`AsyncRequest::response`]
/// and [`AsyncRequest::cancel`] consume the handle, so awaiting a result
/// after cancellation is not expressible.
#[derive(Debug)]
pub struct AsyncRequest {
    rx: Option<oneshot::Receiver<FileSourceResult<Response>>>,
    cancel: CancellationToken,
}

impl AsyncRequest {
    /// Create a request handle and its worker-side counterpart.
    pub(crate) fn channel() -> (Self, ResponseSender) {
        let (tx, rx) = oneshot::channel();
        let cancel = CancellationToken::new();

        let request = Self {
            rx: Some(rx),
            cancel: cancel.clone(),
        };
        let sender = ResponseSender { tx, cancel };
        (request, sender)
    }

    /// A handle whose result is already known. Used by sources that can
    /// answer without scheduling work.
    pub(crate) fn ready(result: FileSourceResult<Response>) -> Self {
        let (request, sender) = Self::channel();
        sender.send(result);
        request
    }

    /// Wait for the result. Returns [`FileSourceError::Shutdown`] if the
    /// serving source went away before answering.
    pub async fn response(mut self) -> FileSourceResult<Response> {
        let Some(rx) = self.rx.take() else {
            return Err(FileSourceError::Shutdown);
        };
        match rx.await {
            Ok(result) => result,
            Err(_) => Err(FileSourceError::Shutdown),
        }
    }

    /// Cancel explicitly. Equivalent to dropping the handle.
    pub fn cancel(self) {}
}

impl Drop for AsyncRequest {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Worker-side end of an [`AsyncRequest`].
#[derive(Debug)]
pub(crate) struct ResponseSender {
    tx: oneshot::Sender<FileSourceResult<Response>>,
    cancel: CancellationToken,
}

impl ResponseSender {
    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deliver the result unless the requester has cancelled. A
    /// cancelled or already-dropped receiver discards the result
    /// silently.
    pub(crate) fn send(self, result: FileSourceResult<Response>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.tx.send(result);
    }
}
