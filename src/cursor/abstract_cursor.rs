use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use crate::error::{CursorError, Result};
use crate::operation::{CursorResponse, ExecutionResult};
use crate::options::{CursorFlag, CursorOptions, Namespace, ReadPreference};
use crate::topology::{GetMoreOptions, Server, Session, Topology};

use super::CursorState;
use super::buffer::BatchBuffer;
use super::session::{CursorSession, SessionOwnership};

/// Batch size requested by getMore when none was configured.
pub const DEFAULT_BATCH_SIZE: u32 = 1000;

/// The command shape behind a cursor.
///
/// Each cursor variant supplies one implementation. The engine calls
/// `initialize` exactly once, on the first pull.
#[async_trait]
pub trait CursorCommand: fmt::Debug + Send + Sync + 'static {
    /// Namespace the cursor is expected to iterate
    fn namespace(&self) -> &Namespace;

    /// Run the command that opens the server-side cursor.
    ///
    /// # Arguments
    /// * `topology` - Topology to select a server from
    /// * `session` - Session to run under, if any
    /// * `options` - The cursor's current options
    ///
    /// # Returns
    /// * `Result<ExecutionResult>` - The server, session and raw first-batch reply
    async fn initialize(
        &self,
        topology: &dyn Topology,
        session: Option<Arc<dyn Session>>,
        options: &CursorOptions,
    ) -> Result<ExecutionResult>;

    /// Batch size for the next getMore, given the configured size and the
    /// number of documents received so far. `None` means the command needs
    /// no more documents and the cursor should be closed.
    fn get_more_batch_size(&self, batch_size: u32, _num_returned: u64) -> Option<u32> {
        Some(batch_size)
    }
}

/// Why a cursor was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// The server reported no more results, or a limit was reached
    Exhausted,
    /// The caller closed the cursor
    Closed,
    /// An initialize or getMore failed
    Failed,
}

/// Cursor state machine shared by every command shape.
///
/// Documents are pulled from the server lazily: the first pull runs the
/// command, later pulls drain the buffer and issue `getMore` against the
/// server that produced the first batch. Reaching the end, closing, or failing
/// releases the server cursor and any implicit session exactly once.
pub struct AbstractCursor<C: CursorCommand> {
    command: C,
    topology: Arc<dyn Topology>,
    options: CursorOptions,

    id: Option<i64>,
    namespace: Namespace,
    server: Option<Arc<dyn Server>>,
    buffer: BatchBuffer,
    session: Option<CursorSession>,

    closed: bool,
    killed: bool,
    close_reason: Option<CloseReason>,
    num_returned: u64,
    cleanup_error: Option<CursorError>,
    close_tx: watch::Sender<bool>,
}

impl<C: CursorCommand> AbstractCursor<C> {
    /// Create an uninitialized cursor
    ///
    /// # Arguments
    /// * `topology` - Topology the first pull selects a server and session from
    /// * `command` - Command that opens the server-side cursor
    /// * `options` - Cursor options; a session in them is borrowed, never ended
    ///
    /// # Returns
    /// * `Self` - A cursor that performs no I/O until the first pull
    pub fn new(topology: Arc<dyn Topology>, command: C, options: CursorOptions) -> Self {
        let namespace = command.namespace().clone();
        let session = options.session.clone().map(CursorSession::borrowed);
        let (close_tx, _) = watch::channel(false);

        Self {
            command,
            topology,
            options,
            id: None,
            namespace,
            server: None,
            buffer: BatchBuffer::new(),
            session,
            closed: false,
            killed: false,
            close_reason: None,
            num_returned: 0,
            cleanup_error: None,
            close_tx,
        }
    }

    /* ========================= Accessors ========================= */

    /// Server-side cursor id. `None` before initialization, `Some(0)` once exhausted.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether `killCursors` has been issued for this cursor.
    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn state(&self) -> CursorState {
        match (self.closed, self.id) {
            (true, _) => CursorState::Closed,
            (false, None) => CursorState::Uninitialized,
            (false, Some(0)) => CursorState::Exhausted,
            (false, Some(_)) => CursorState::Active,
        }
    }

    pub fn options(&self) -> &CursorOptions {
        &self.options
    }

    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref().map(CursorSession::session)
    }

    pub fn session_ownership(&self) -> Option<SessionOwnership> {
        self.session.as_ref().map(CursorSession::ownership)
    }

    /// Server every getMore targets, fixed at initialization.
    pub fn server(&self) -> Option<&Arc<dyn Server>> {
        self.server.as_ref()
    }

    /// Documents received from the server so far.
    pub fn num_returned(&self) -> u64 {
        self.num_returned
    }

    /// Receiver that flips to `true` once, when the cursor closes.
    pub fn subscribe_close(&self) -> watch::Receiver<bool> {
        self.close_tx.subscribe()
    }

    /// Take the last cleanup failure that was logged instead of returned.
    pub fn take_cleanup_error(&mut self) -> Option<CursorError> {
        self.cleanup_error.take()
    }

    pub(crate) fn command(&self) -> &C {
        &self.command
    }

    pub(crate) fn command_mut(&mut self) -> &mut C {
        &mut self.command
    }

    pub(crate) fn topology(&self) -> &Arc<dyn Topology> {
        &self.topology
    }

    /* ========================= Option setters ========================= */

    /// Fail with `CursorInUse` once the cursor has been initialized or closed.
    pub(crate) fn assert_uninitialized(&self) -> Result<()> {
        if self.id.is_some() {
            return Err(CursorError::CursorInUse(
                "Cursor is already initialized".to_string(),
            ));
        }
        if self.closed {
            return Err(CursorError::CursorInUse("Cursor is closed".to_string()));
        }
        Ok(())
    }

    pub(crate) fn is_tailable(&self) -> bool {
        self.options.flags.tailable
    }

    /// Set a named cursor flag
    ///
    /// # Arguments
    /// * `name` - One of `tailable`, `oplogReplay`, `noCursorTimeout`, `awaitData`, `partial`
    /// * `value` - Whether the flag is set
    ///
    /// # Returns
    /// * `Result<&mut Self>` - `InvalidArgument` for unknown or unsupported flags
    pub fn add_cursor_flag(&mut self, name: &str, value: bool) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        let flag: CursorFlag = name.parse()?;
        self.options.flags.set(flag, value);
        Ok(self)
    }

    pub fn set_read_preference(&mut self, read_preference: ReadPreference) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        self.options.read_preference = read_preference;
        Ok(self)
    }

    /// Set the read preference by registry name, e.g. `secondaryPreferred`.
    pub fn set_read_preference_named(&mut self, name: &str) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        self.options.read_preference = ReadPreference::from_name(name)?;
        Ok(self)
    }

    pub fn batch_size(&mut self, batch_size: i32) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        if self.is_tailable() {
            return Err(CursorError::InvalidArgument(
                "Tailable cursor does not support batchSize".to_string(),
            ));
        }
        let batch_size = u32::try_from(batch_size).map_err(|_| {
            CursorError::InvalidArgument(format!(
                "batchSize must be a non-negative integer, got {batch_size}"
            ))
        })?;
        self.options.batch_size = Some(batch_size);
        Ok(self)
    }

    pub fn max_time_ms(&mut self, max_time_ms: i64) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        let max_time_ms = u64::try_from(max_time_ms).map_err(|_| {
            CursorError::InvalidArgument(format!(
                "maxTimeMS must be a non-negative integer, got {max_time_ms}"
            ))
        })?;
        self.options.max_time_ms = Some(max_time_ms);
        Ok(self)
    }

    /// Time a tailable `awaitData` cursor lets each getMore wait.
    pub fn max_await_time_ms(&mut self, max_await_time_ms: i64) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        let max_await_time_ms = u64::try_from(max_await_time_ms).map_err(|_| {
            CursorError::InvalidArgument(format!(
                "maxAwaitTimeMS must be a non-negative integer, got {max_await_time_ms}"
            ))
        })?;
        self.options.max_await_time_ms = Some(max_await_time_ms);
        Ok(self)
    }

    pub fn comment(&mut self, comment: impl Into<Bson>) -> Result<&mut Self> {
        self.assert_uninitialized()?;
        self.options.comment = Some(comment.into());
        Ok(self)
    }

    /// Compose `transform` after any transform already set.
    ///
    /// `cursor.map(f).map(g)` yields `g(f(doc))`. Allowed at any time; documents
    /// already buffered are transformed when they leave the buffer.
    pub fn map<F>(&mut self, transform: F) -> &mut Self
    where
        F: Fn(Document) -> Document + Send + Sync + 'static,
    {
        self.buffer.compose_transform(Arc::new(transform));
        self
    }

    /* ========================= Iteration ========================= */

    /// Next document, or `None` once the cursor is exhausted.
    ///
    /// Fails with `CursorExhausted` when the cursor was already closed by the
    /// caller or by an earlier failure.
    pub async fn next(&mut self) -> Result<Option<Document>> {
        self.assert_not_dead()?;
        let document = self.fetch_next(true).await?;
        Ok(document.map(|document| self.buffer.apply(document)))
    }

    /// Next document deserialized into `T`.
    pub async fn next_as<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        match self.next().await? {
            Some(document) => Ok(Some(bson::from_document(document)?)),
            None => Ok(None),
        }
    }

    /// Like `next`, but returns `None` after a single empty getMore instead of
    /// polling again. Useful for tailable cursors.
    pub async fn try_next(&mut self) -> Result<Option<Document>> {
        self.assert_not_dead()?;
        let document = self.fetch_next(false).await?;
        Ok(document.map(|document| self.buffer.apply(document)))
    }

    /// Whether another document is available. The document stays buffered.
    pub async fn has_next(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        match self.fetch_next(true).await? {
            Some(document) => {
                self.buffer.push_front_raw(document);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Collect every remaining document. Each is transformed exactly once.
    pub async fn to_array(&mut self) -> Result<Vec<Document>> {
        let mut documents = Vec::new();
        loop {
            self.buffer.drain_into(&mut documents, None);
            match self.next().await? {
                Some(document) => documents.push(document),
                None => return Ok(documents),
            }
        }
    }

    /// Call `visitor` for each remaining document until it returns `false`.
    ///
    /// Stopping early leaves the cursor open.
    pub async fn for_each<F>(&mut self, mut visitor: F) -> Result<()>
    where
        F: FnMut(Document) -> bool + Send,
    {
        while let Some(document) = self.next().await? {
            if !visitor(document) {
                break;
            }
        }
        Ok(())
    }

    /// Number of documents buffered locally.
    pub fn buffered_count(&self) -> usize {
        self.buffer.len()
    }

    /// Take up to `count` buffered documents (all when `None`) without any
    /// network round trip. The transform is applied.
    pub fn read_buffered_documents(&mut self, count: Option<usize>) -> Vec<Document> {
        let mut documents = Vec::new();
        self.buffer.drain_into(&mut documents, count);
        documents
    }

    /// Close the cursor, killing the server cursor if it is still live and
    /// ending an owned session.
    ///
    /// The cursor is closed even when this returns an error. Calling it again
    /// only finishes cleanup steps an abandoned close left undone; `killCursors`
    /// is never sent twice and the session is never ended twice.
    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            debug!("Closing cursor on {}", self.namespace);
        }
        self.cleanup(CloseReason::Closed).await
    }

    fn assert_not_dead(&self) -> Result<()> {
        match self.close_reason {
            Some(CloseReason::Closed) | Some(CloseReason::Failed) => {
                Err(CursorError::CursorExhausted)
            }
            _ => Ok(()),
        }
    }

    /// Pull the next raw document, initializing or advancing as needed.
    ///
    /// With `blocking` unset, an empty getMore on a live cursor yields `None`
    /// instead of another round trip.
    async fn fetch_next(&mut self, blocking: bool) -> Result<Option<Document>> {
        loop {
            if self.closed {
                return Ok(None);
            }
            if let Some(document) = self.buffer.pop_front_raw() {
                return Ok(Some(document));
            }

            match self.id {
                None => self.initialize().await?,
                Some(0) => {
                    self.cleanup_quietly(CloseReason::Exhausted).await;
                    return Ok(None);
                }
                Some(_) => {
                    self.get_more().await?;
                    if !blocking && self.buffer.is_empty() && !self.closed && self.id != Some(0) {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /* ========================= Network steps ========================= */

    async fn initialize(&mut self) -> Result<()> {
        if self.session.is_none() && self.topology.has_session_support() {
            match self.topology.start_session().await {
                Ok(session) => {
                    debug!("Started implicit session {}", session.id());
                    self.session = Some(CursorSession::owned(session));
                }
                Err(error) => return Err(self.fail(error).await),
            }
        }

        let session = self.session.as_ref().map(|s| s.session().clone());
        let execution = match self
            .command
            .initialize(self.topology.as_ref(), session, &self.options)
            .await
        {
            Ok(execution) => execution,
            Err(error) => return Err(self.fail(error).await),
        };

        let response = match CursorResponse::parse(execution.response, &execution.namespace) {
            Ok(response) => response,
            Err(error) => return Err(self.fail(error).await),
        };

        debug!(
            "Opened cursor {} on {} via {} with {} documents",
            response.id,
            response.namespace,
            execution.server.address(),
            response.batch.len()
        );

        if self.session.is_none() {
            self.session = execution.session.map(CursorSession::owned);
        }
        self.id = Some(response.id);
        self.namespace = response.namespace;
        self.server = Some(execution.server);
        self.receive(response.batch);

        if response.id == 0 {
            self.release_session_quietly().await;
        }
        Ok(())
    }

    async fn get_more(&mut self) -> Result<()> {
        let Some(server) = self.server.clone() else {
            let error =
                CursorError::IllegalState("unable to iterate cursor without pinned server".to_string());
            return Err(self.fail(error).await);
        };
        let id = self.id.unwrap_or_default();

        let configured = self.options.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        let Some(batch_size) = self.command.get_more_batch_size(configured, self.num_returned) else {
            debug!("Cursor {} reached its limit after {} documents", id, self.num_returned);
            self.cleanup_quietly(CloseReason::Exhausted).await;
            return Ok(());
        };

        let flags = self.options.flags;
        let options = GetMoreOptions {
            batch_size: Some(batch_size),
            max_time_ms: self
                .options
                .max_await_time_ms
                .filter(|_| flags.tailable && flags.await_data),
            comment: self.options.comment.clone(),
        };

        trace!("getMore cursor {} on {} (batchSize {})", id, server.address(), batch_size);
        let session = self.session.as_ref().map(|s| s.session().clone());
        let response = server
            .get_more(&self.namespace, id, &options, session.as_deref())
            .await
            .and_then(|reply| CursorResponse::parse(reply, &self.namespace));

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                debug!("getMore for cursor {} failed: {}", id, error);
                return Err(self.fail(error).await);
            }
        };

        self.id = Some(response.id);
        self.receive(response.batch);
        if response.id == 0 {
            debug!("Cursor {} exhausted after {} documents", id, self.num_returned);
            self.release_session_quietly().await;
        }
        Ok(())
    }

    fn receive(&mut self, batch: Vec<Document>) {
        self.num_returned += batch.len() as u64;
        self.buffer.replace(batch);
    }

    /* ========================= Cleanup ========================= */

    /// Run the cleanup owed after `error` and hand the error back unchanged.
    async fn fail(&mut self, error: CursorError) -> CursorError {
        self.cleanup_quietly(CloseReason::Failed).await;
        error
    }

    /// Cleanup whose failure is logged and kept for `take_cleanup_error`.
    async fn cleanup_quietly(&mut self, reason: CloseReason) {
        if let Err(error) = self.cleanup(reason).await {
            warn!("Cleanup of cursor on {} failed: {}", self.namespace, error);
            self.cleanup_error = Some(error);
        }
    }

    /// Mark the cursor closed, kill the server cursor if live and release the
    /// session. The first failure is returned after every step has run.
    ///
    /// Each step carries its own done flag, so running cleanup again after the
    /// future was dropped mid-way resumes at the first unfinished step.
    async fn cleanup(&mut self, reason: CloseReason) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.close_reason = Some(reason);
            self.buffer.clear();
            self.close_tx.send_replace(true);
        }

        let killed = self.kill().await;
        let released = self.release_session().await;
        killed.and(released)
    }

    async fn kill(&mut self) -> Result<()> {
        let Some(id) = self.id.filter(|id| *id != 0) else {
            return Ok(());
        };
        if self.killed {
            return Ok(());
        }
        let Some(server) = self.server.clone() else {
            return Ok(());
        };
        self.killed = true;

        debug!("Killing cursor {} on {}", id, server.address());
        let session = self.session.as_ref().map(|s| s.session().clone());
        server
            .kill_cursors(&self.namespace, &[id], session.as_deref())
            .await
    }

    async fn release_session(&mut self) -> Result<()> {
        match self.session.as_mut() {
            Some(session) => session.release().await.map(|_| ()),
            None => Ok(()),
        }
    }

    async fn release_session_quietly(&mut self) {
        if let Err(error) = self.release_session().await {
            warn!("Ending session of cursor on {} failed: {}", self.namespace, error);
            self.cleanup_error = Some(error);
        }
    }
}

impl<C: CursorCommand + Clone> AbstractCursor<C> {
    /// A fresh, uninitialized cursor running the same command with the same
    /// options. A borrowed session is carried over; the transform is not.
    pub fn clone_cursor(&self) -> Self {
        let mut options = self.options.clone();
        options.session = match self.session.as_ref() {
            Some(session) if session.ownership() == SessionOwnership::Borrowed => {
                Some(session.session().clone())
            }
            _ => None,
        };
        Self::new(self.topology.clone(), self.command.clone(), options)
    }
}

impl<C: CursorCommand> fmt::Debug for AbstractCursor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractCursor")
            .field("command", &self.command)
            .field("namespace", &self.namespace)
            .field("id", &self.id)
            .field("state", &self.state())
            .field("buffered", &self.buffer.len())
            .field("killed", &self.killed)
            .field("session", &self.session_ownership())
            .finish()
    }
}
