//! Command operations that open cursors
//!
//! This module contains:
//! - The `Operation` trait and `execute_operation`, which selects a server and
//!   runs an operation, producing an `ExecutionResult`
//! - `CursorResponse`, the normalized shape of a cursor reply
//! - Builders for the `getMore` and `killCursors` commands
//! - Find, aggregate and explain operations

mod aggregate;
mod find;

use std::sync::Arc;

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use tracing::debug;

use crate::error::{CursorError, Result};
use crate::options::{ExplainVerbosity, Namespace, ReadPreference};
use crate::topology::{GetMoreOptions, Server, Session, Topology};

pub use aggregate::{AggregateOperation, AggregateOptions};
pub use find::{FindOperation, FindOptions};

/// Result of running the initial command of a cursor.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Server that produced the reply. Every getMore must target it.
    pub server: Arc<dyn Server>,

    /// Session the command ran under
    pub session: Option<Arc<dyn Session>>,

    /// Namespace the command targeted
    pub namespace: Namespace,

    /// Raw first-batch reply
    pub response: Document,
}

/// A command that runs against one selected server.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Command name, for logging
    fn name(&self) -> &'static str;

    fn namespace(&self) -> &Namespace;

    fn read_preference(&self) -> ReadPreference {
        ReadPreference::Primary
    }

    /// Build the command document.
    fn build_command(&self) -> Result<Document>;

    /// Run the command on `server`.
    async fn execute(&self, server: &dyn Server, session: Option<&dyn Session>) -> Result<Document> {
        let command = self.build_command()?;
        debug!(
            "Running {} on {} against {}",
            self.name(),
            self.namespace(),
            server.address()
        );
        let reply = server
            .run_command(&self.namespace().db, command, session)
            .await?;
        check_command_response(reply)
    }
}

/// Select a server for `operation` and execute it.
///
/// No retry happens here. An ended session is rejected before any network
/// activity.
pub async fn execute_operation<O>(
    topology: &dyn Topology,
    operation: &O,
    session: Option<Arc<dyn Session>>,
) -> Result<ExecutionResult>
where
    O: Operation + ?Sized,
{
    if session.as_ref().is_some_and(|s| s.has_ended()) {
        return Err(CursorError::InvalidArgument(
            "Use of expired sessions is not permitted".to_string(),
        ));
    }

    let server = topology.select_server(&operation.read_preference()).await?;
    let response = operation.execute(server.as_ref(), session.as_deref()).await?;

    Ok(ExecutionResult {
        server,
        session,
        namespace: operation.namespace().clone(),
        response,
    })
}

/// Turn an `ok: 0` reply into an `OperationFailed` error.
pub fn check_command_response(reply: Document) -> Result<Document> {
    let ok = reply.get("ok").and_then(bson_as_f64).unwrap_or(1.0);
    if ok == 1.0 {
        return Ok(reply);
    }

    let code = reply.get("code").and_then(bson_as_i64).map(|c| c as i32);
    let message = reply
        .get_str("errmsg")
        .unwrap_or("command failed without an error message")
        .to_string();
    Err(CursorError::OperationFailed { code, message })
}

/// Build a `getMore` command.
pub fn get_more_command(namespace: &Namespace, cursor_id: i64, options: &GetMoreOptions) -> Document {
    let mut command = doc! {
        "getMore": cursor_id,
        "collection": namespace.coll.as_str(),
    };

    if let Some(batch_size) = options.batch_size.filter(|size| *size > 0) {
        command.insert("batchSize", i64::from(batch_size));
    }
    if let Some(max_time_ms) = options.max_time_ms {
        command.insert("maxTimeMS", i64::try_from(max_time_ms).unwrap_or(i64::MAX));
    }
    if let Some(comment) = &options.comment {
        command.insert("comment", comment.clone());
    }

    command
}

/// Build a `killCursors` command.
pub fn kill_cursors_command(namespace: &Namespace, cursor_ids: &[i64]) -> Document {
    doc! {
        "killCursors": namespace.coll.as_str(),
        "cursors": cursor_ids.to_vec(),
    }
}

/// Cursor reply normalized from either wire shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorResponse {
    pub id: i64,
    pub namespace: Namespace,
    pub batch: Vec<Document>,
}

impl CursorResponse {
    /// Parse a reply carrying either a `cursor` sub-document
    /// (`{ id, ns, firstBatch | nextBatch }`) or the legacy top-level
    /// `cursorId` / `documents` fields.
    pub fn parse(mut reply: Document, fallback: &Namespace) -> Result<Self> {
        if let Some(cursor) = reply.remove("cursor") {
            let Bson::Document(mut cursor) = cursor else {
                return Err(CursorError::operation_failed(
                    "reply field 'cursor' is not a document",
                ));
            };

            let id = cursor
                .get("id")
                .and_then(bson_as_i64)
                .ok_or_else(|| CursorError::operation_failed("cursor reply is missing 'id'"))?;
            let namespace = match cursor.get("ns") {
                Some(Bson::String(ns)) => ns.parse().unwrap_or_else(|_| fallback.clone()),
                _ => fallback.clone(),
            };
            let batch = match cursor.remove("firstBatch").or_else(|| cursor.remove("nextBatch")) {
                Some(batch) => documents_from(batch)?,
                None => Vec::new(),
            };

            return Ok(Self { id, namespace, batch });
        }

        if reply.contains_key("cursorId") || reply.contains_key("documents") {
            let id = match reply.get("cursorId") {
                Some(value) => bson_as_i64(value).ok_or_else(|| {
                    CursorError::operation_failed("legacy reply has a non-numeric 'cursorId'")
                })?,
                None => 0,
            };
            let batch = match reply.remove("documents") {
                Some(batch) => documents_from(batch)?,
                None => Vec::new(),
            };

            return Ok(Self {
                id,
                namespace: fallback.clone(),
                batch,
            });
        }

        Err(CursorError::operation_failed("reply does not describe a cursor"))
    }
}

fn documents_from(batch: Bson) -> Result<Vec<Document>> {
    let Bson::Array(items) = batch else {
        return Err(CursorError::operation_failed("cursor batch is not an array"));
    };

    items
        .into_iter()
        .map(|item| match item {
            Bson::Document(document) => Ok(document),
            other => Err(CursorError::operation_failed(format!(
                "cursor batch contains a non-document value: {other}"
            ))),
        })
        .collect()
}

pub(crate) fn bson_as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

fn bson_as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        Bson::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// `explain` wrapper around a cursor-opening command.
#[derive(Debug)]
pub struct ExplainOperation {
    namespace: Namespace,
    command: Document,
    verbosity: ExplainVerbosity,
    read_preference: ReadPreference,
}

impl ExplainOperation {
    pub fn new(
        namespace: Namespace,
        command: Document,
        verbosity: ExplainVerbosity,
        read_preference: ReadPreference,
    ) -> Self {
        Self {
            namespace,
            command,
            verbosity,
            read_preference,
        }
    }
}

impl Operation for ExplainOperation {
    fn name(&self) -> &'static str {
        "explain"
    }

    fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    fn read_preference(&self) -> ReadPreference {
        self.read_preference
    }

    fn build_command(&self) -> Result<Document> {
        Ok(doc! {
            "explain": self.command.clone(),
            "verbosity": self.verbosity.as_str(),
        })
    }
}
