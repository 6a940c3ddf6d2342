//! Scripted collaborators for unit tests.

use std::any::Any;
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mongodb::bson::{Document, doc};
use uuid::Uuid;

use crate::error::{CursorError, Result};
use crate::options::{Namespace, ReadPreference};
use crate::topology::{Server, Session, Topology};

pub(crate) fn test_namespace() -> Namespace {
    Namespace::new("app", "users")
}

/// `{ n: start }` .. `{ n: end - 1 }`
pub(crate) fn numbered(range: Range<i32>) -> Vec<Document> {
    range.map(|n| doc! { "n": n }).collect()
}

pub(crate) fn first_batch(id: i64, documents: Vec<Document>) -> Document {
    doc! {
        "cursor": { "id": id, "ns": "app.users", "firstBatch": documents },
        "ok": 1,
    }
}

pub(crate) fn next_batch(id: i64, documents: Vec<Document>) -> Document {
    doc! {
        "cursor": { "id": id, "ns": "app.users", "nextBatch": documents },
        "ok": 1,
    }
}

#[derive(Debug)]
pub(crate) struct MockSession {
    id: Uuid,
    ends: AtomicUsize,
    fail_end: bool,
}

impl MockSession {
    pub(crate) fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            ends: AtomicUsize::new(0),
            fail_end: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail_end: true,
            ..Self::new()
        }
    }

    pub(crate) fn end_count(&self) -> usize {
        self.ends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn has_ended(&self) -> bool {
        self.end_count() > 0
    }

    async fn end(&self) -> Result<()> {
        self.ends.fetch_add(1, Ordering::SeqCst);
        if self.fail_end {
            return Err(CursorError::operation_failed("endSessions failed"));
        }
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Server replaying scripted replies in order and recording every command.
///
/// `killCursors` has its own queue and succeeds when nothing is scripted.
/// After `stall_kill`, it is recorded but never answers.
#[derive(Debug)]
pub(crate) struct MockServer {
    replies: Mutex<VecDeque<Result<Document>>>,
    kill_replies: Mutex<VecDeque<Result<Document>>>,
    stall_kill: AtomicBool,
    commands: Mutex<Vec<(Document, Option<Uuid>)>>,
}

impl MockServer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::new()),
            kill_replies: Mutex::new(VecDeque::new()),
            stall_kill: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn reply(&self, reply: Document) {
        self.replies.lock().unwrap().push_back(Ok(reply));
    }

    pub(crate) fn fail(&self, error: CursorError) {
        self.replies.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn fail_kill(&self, error: CursorError) {
        self.kill_replies.lock().unwrap().push_back(Err(error));
    }

    pub(crate) fn stall_kill(&self) {
        self.stall_kill.store(true, Ordering::SeqCst);
    }

    /// Number of recorded commands of any kind.
    pub(crate) fn total(&self) -> usize {
        self.commands.lock().unwrap().len()
    }

    /// Number of recorded commands named `name`.
    pub(crate) fn count(&self, name: &str) -> usize {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(command, _)| command_name(command) == name)
            .count()
    }

    pub(crate) fn commands(&self, name: &str) -> Vec<Document> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .filter(|(command, _)| command_name(command) == name)
            .map(|(command, _)| command.clone())
            .collect()
    }

    /// Session ids in command order.
    pub(crate) fn session_ids(&self) -> Vec<Option<Uuid>> {
        self.commands
            .lock()
            .unwrap()
            .iter()
            .map(|(_, session)| *session)
            .collect()
    }
}

fn command_name(command: &Document) -> &str {
    command.keys().next().map(String::as_str).unwrap_or_default()
}

#[async_trait]
impl Server for MockServer {
    fn address(&self) -> &str {
        "mock:27017"
    }

    async fn run_command(
        &self,
        _db: &str,
        command: Document,
        session: Option<&dyn Session>,
    ) -> Result<Document> {
        let name = command_name(&command).to_string();
        self.commands
            .lock()
            .unwrap()
            .push((command, session.map(|s| s.id())));

        if name == "killCursors" {
            if self.stall_kill.load(Ordering::SeqCst) {
                return std::future::pending().await;
            }
            return self
                .kill_replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(doc! { "ok": 1 }));
        }

        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CursorError::IllegalState(format!("no scripted reply for {name}"))))
    }
}

#[derive(Debug)]
pub(crate) struct MockTopology {
    server: Arc<MockServer>,
    session_support: bool,
    sessions: Mutex<Vec<Arc<MockSession>>>,
    selections: Mutex<Vec<ReadPreference>>,
}

impl MockTopology {
    pub(crate) fn new(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            session_support: true,
            sessions: Mutex::new(Vec::new()),
            selections: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn without_sessions(server: Arc<MockServer>) -> Arc<Self> {
        Arc::new(Self {
            server,
            session_support: false,
            sessions: Mutex::new(Vec::new()),
            selections: Mutex::new(Vec::new()),
        })
    }

    /// Sessions started implicitly through this topology.
    pub(crate) fn sessions(&self) -> Vec<Arc<MockSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub(crate) fn selections(&self) -> Vec<ReadPreference> {
        self.selections.lock().unwrap().clone()
    }
}

#[async_trait]
impl Topology for MockTopology {
    fn has_session_support(&self) -> bool {
        self.session_support
    }

    async fn start_session(&self) -> Result<Arc<dyn Session>> {
        let session = Arc::new(MockSession::new());
        self.sessions.lock().unwrap().push(session.clone());
        Ok(session)
    }

    async fn select_server(&self, read_preference: &ReadPreference) -> Result<Arc<dyn Server>> {
        self.selections.lock().unwrap().push(*read_preference);
        Ok(self.server.clone())
    }
}
