//! Collaborator contracts consumed by the cursor engine
//!
//! The cursor layer does not select servers, pool connections or encode wire
//! messages. It talks to three collaborators:
//! - `Topology`: server selection and session provisioning
//! - `Server`: command execution plus the `getMore` / `killCursors` primitives
//! - `Session`: a logical session that can be ended once
//!
//! `connection::MongoTopology` implements these over the official driver; tests
//! use scripted implementations.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::Document;
use uuid::Uuid;

use crate::error::Result;
use crate::operation::{check_command_response, get_more_command, kill_cursors_command};
use crate::options::{Namespace, ReadPreference};

/// Options for a single `getMore` round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetMoreOptions {
    /// Requested batch size (omitted from the command when `None`)
    pub batch_size: Option<u32>,

    /// `maxTimeMS` for the getMore, set from `maxAwaitTimeMS` on awaitData cursors
    pub max_time_ms: Option<u64>,

    /// Comment carried over from the originating command
    pub comment: Option<mongodb::bson::Bson>,
}

/// A logical server session.
#[async_trait]
pub trait Session: fmt::Debug + Send + Sync {
    /// Client-side identifier, used in logs
    fn id(&self) -> Uuid;

    /// Whether `end` has already run
    fn has_ended(&self) -> bool;

    /// End the session and release its server-side resources.
    async fn end(&self) -> Result<()>;

    /// Access to the concrete type, for bindings that need driver handles.
    fn as_any(&self) -> &dyn Any;
}

/// A selected server able to run commands.
#[async_trait]
pub trait Server: fmt::Debug + Send + Sync {
    /// Address of the server, e.g. `localhost:27017`
    fn address(&self) -> &str;

    /// Run a raw command against `db` and return the server's reply.
    async fn run_command(
        &self,
        db: &str,
        command: Document,
        session: Option<&dyn Session>,
    ) -> Result<Document>;

    /// Advance a server-side cursor.
    async fn get_more(
        &self,
        namespace: &Namespace,
        cursor_id: i64,
        options: &GetMoreOptions,
        session: Option<&dyn Session>,
    ) -> Result<Document> {
        let command = get_more_command(namespace, cursor_id, options);
        let reply = self.run_command(&namespace.db, command, session).await?;
        check_command_response(reply)
    }

    /// Destroy server-side cursors.
    async fn kill_cursors(
        &self,
        namespace: &Namespace,
        cursor_ids: &[i64],
        session: Option<&dyn Session>,
    ) -> Result<()> {
        let command = kill_cursors_command(namespace, cursor_ids);
        let reply = self.run_command(&namespace.db, command, session).await?;
        check_command_response(reply)?;
        Ok(())
    }
}

/// Server selection and session provisioning.
#[async_trait]
pub trait Topology: fmt::Debug + Send + Sync {
    /// Whether the deployment supports logical sessions
    fn has_session_support(&self) -> bool;

    /// Start a new session.
    async fn start_session(&self) -> Result<Arc<dyn Session>>;

    /// Select a server suitable for `read_preference`.
    async fn select_server(&self, read_preference: &ReadPreference) -> Result<Arc<dyn Server>>;
}
