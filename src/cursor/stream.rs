//! Pull-based `Stream` over a cursor
//!
//! Each downstream poll runs at most one `next()` on the cursor. The stream
//! closes the cursor when it ends, when it fails, and when it is dropped
//! early. Documents still buffered at that point are discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures::Stream;
use futures::future::BoxFuture;
use mongodb::bson::Document;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::error::{CursorError, Result};

use super::abstract_cursor::{AbstractCursor, CursorCommand};
use super::buffer::{Transform, compose};

/// Outcome of one pull.
enum Pull {
    Document(Document),
    End,
    Failed(CursorError),
}

/// A `Stream` of documents backed by a cursor.
pub struct CursorStream<C: CursorCommand> {
    cursor: Arc<Mutex<AbstractCursor<C>>>,
    transform: Option<Transform>,
    pending: Option<BoxFuture<'static, Pull>>,
    finished: bool,
}

impl<C: CursorCommand> CursorStream<C> {
    pub fn new(cursor: AbstractCursor<C>) -> Self {
        Self {
            cursor: Arc::new(Mutex::new(cursor)),
            transform: None,
            pending: None,
            finished: false,
        }
    }

    /// Apply `transform` to each document after the cursor's own transform.
    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Document) -> Document + Send + Sync + 'static,
    {
        self.transform = Some(compose(self.transform.take(), Arc::new(transform)));
        self
    }

    /// Whether the stream has yielded its last item.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    #[cfg(test)]
    pub(crate) fn shared_cursor(&self) -> Arc<Mutex<AbstractCursor<C>>> {
        self.cursor.clone()
    }

    /// Stop streaming and close the cursor.
    pub async fn close(mut self) -> Result<()> {
        self.finished = true;
        self.pending = None;
        let mut cursor = self.cursor.lock().await;
        cursor.close().await
    }
}

fn pull<C: CursorCommand>(cursor: Arc<Mutex<AbstractCursor<C>>>) -> BoxFuture<'static, Pull> {
    Box::pin(async move {
        let mut cursor = cursor.lock_owned().await;
        match cursor.next().await {
            Ok(Some(document)) => Pull::Document(document),
            Ok(None) => {
                close_quietly(&mut cursor).await;
                Pull::End
            }
            Err(error) if error.is_benign_stream_termination() => {
                debug!("Stream on {} ended: {}", cursor.namespace(), error);
                close_quietly(&mut cursor).await;
                Pull::End
            }
            Err(error) => {
                close_quietly(&mut cursor).await;
                Pull::Failed(error)
            }
        }
    })
}

async fn close_quietly<C: CursorCommand>(cursor: &mut OwnedMutexGuard<AbstractCursor<C>>) {
    if let Err(error) = cursor.close().await {
        warn!("Failed to close cursor on {}: {}", cursor.namespace(), error);
    }
}

impl<C: CursorCommand> Stream for CursorStream<C> {
    type Item = Result<Document>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let future = this
            .pending
            .get_or_insert_with(|| pull(this.cursor.clone()));
        let outcome = ready!(future.as_mut().poll(cx));
        this.pending = None;

        match outcome {
            Pull::Document(document) => {
                let document = match &this.transform {
                    Some(transform) => transform(document),
                    None => document,
                };
                Poll::Ready(Some(Ok(document)))
            }
            Pull::End => {
                this.finished = true;
                Poll::Ready(None)
            }
            Pull::Failed(error) => {
                this.finished = true;
                Poll::Ready(Some(Err(error)))
            }
        }
    }
}

impl<C: CursorCommand> Drop for CursorStream<C> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Releases the cursor lock if a pull was in flight.
        self.pending = None;

        let cursor = self.cursor.clone();
        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let mut cursor = cursor.lock_owned().await;
                    close_quietly(&mut cursor).await;
                });
            }
            Err(_) => warn!("Cursor stream dropped outside a runtime; cursor left open"),
        }
    }
}

impl<C: CursorCommand> AbstractCursor<C> {
    /// Convert the cursor into a `Stream` of documents.
    pub fn stream(self) -> CursorStream<C> {
        CursorStream::new(self)
    }
}
