//! Connection to a live MongoDB deployment
//!
//! This module binds the collaborator traits in `topology` to the official
//! driver:
//! - `MongoTopology`: connection establishment with retry, session support
//!   detection, server selection and shutdown
//! - `MongoServer`: runs commands pinned to a single member
//! - `MongoSession`: a driver `ClientSession` that can be ended once

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use mongodb::options::{ClientOptions, SelectionCriteria, ServerAddress};
use mongodb::{Client, ClientSession, ServerInfo};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{CursorError, Result};
use crate::options::ReadPreference;
use crate::topology::{Server, Session, Topology};

/// Connection state information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected and ready
    Connected,

    /// Shut down; every further command fails with `TransportClosed`
    Closed,
}

/// Topology backed by a `mongodb::Client`
///
/// Every server handed out is pinned to the member that answered the initial
/// `hello`, so all getMores of a cursor reach the server that owns it.
#[derive(Debug)]
pub struct MongoTopology {
    /// MongoDB client instance
    client: Client,

    /// Current connection state, shared with every server handle
    state: Arc<RwLock<ConnectionState>>,

    /// Member commands are pinned to
    address: ServerAddress,

    /// Whether `hello` reported logical session support
    sessions_supported: bool,
}

impl MongoTopology {
    /// Connect to MongoDB
    ///
    /// # Arguments
    /// * `config` - Connection configuration (URI, timeout, retries)
    ///
    /// # Returns
    /// * `Result<Self>` - Connected topology or the last connection error
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        let timeout = config.connect_timeout();
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        let hosts = options.hosts.clone();

        let client = Client::with_options(options)?;
        let hello = Self::hello_with_retry(&client, config).await?;

        let address = pinned_address(&hello, &hosts).ok_or_else(|| {
            CursorError::IllegalState(format!("no host to connect to in '{}'", config.uri))
        })?;
        let sessions_supported = supports_sessions(&hello);
        info!(
            "Connected to {} (sessions {})",
            address,
            if sessions_supported { "supported" } else { "unsupported" }
        );

        Ok(Self {
            client,
            state: Arc::new(RwLock::new(ConnectionState::Connected)),
            address,
            sessions_supported,
        })
    }

    /// Attempt `hello` up to `retry_attempts` times
    async fn hello_with_retry(client: &Client, config: &ConnectionConfig) -> Result<Document> {
        let attempts = config.retry_attempts.max(1);
        let delay = config.retry_delay();
        let mut attempt = 1;

        loop {
            match client.database("admin").run_command(doc! { "hello": 1 }).await {
                Ok(reply) => return Ok(reply),
                Err(e) if attempt < attempts => {
                    warn!(
                        "Connection attempt {}/{} failed: {}",
                        attempt, attempts, e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Address every command is pinned to
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Close the client. Later commands fail with `TransportClosed`.
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.write().await;
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }
        debug!("Shutting down connection to {}", self.address);
        self.client.clone().shutdown().await;
    }

    async fn ensure_open(&self) -> Result<()> {
        ensure_open(&self.state, &self.address).await
    }
}

async fn ensure_open(state: &RwLock<ConnectionState>, address: &ServerAddress) -> Result<()> {
    if *state.read().await == ConnectionState::Closed {
        return Err(CursorError::TransportClosed(format!(
            "server {address} is closed"
        )));
    }
    Ok(())
}

/// The member that answered `hello`, falling back to the first seed host
fn pinned_address(hello: &Document, hosts: &[ServerAddress]) -> Option<ServerAddress> {
    hello
        .get_str("me")
        .ok()
        .and_then(|me| ServerAddress::parse(me).ok())
        .or_else(|| hosts.first().cloned())
}

fn supports_sessions(hello: &Document) -> bool {
    !matches!(
        hello.get("logicalSessionTimeoutMinutes"),
        None | Some(Bson::Null)
    )
}

#[async_trait]
impl Topology for MongoTopology {
    fn has_session_support(&self) -> bool {
        self.sessions_supported
    }

    async fn start_session(&self) -> Result<Arc<dyn Session>> {
        self.ensure_open().await?;
        let session = self.client.start_session().await?;
        Ok(Arc::new(MongoSession::new(session)))
    }

    async fn select_server(&self, read_preference: &ReadPreference) -> Result<Arc<dyn Server>> {
        self.ensure_open().await?;
        if read_preference.is_secondary_ok() {
            debug!(
                "Read preference {} served by pinned member {}",
                read_preference, self.address
            );
        }

        Ok(Arc::new(MongoServer {
            client: self.client.clone(),
            label: self.address.to_string(),
            address: self.address.clone(),
            state: self.state.clone(),
        }))
    }
}

/// A server handle that runs every command against one member
#[derive(Debug)]
pub struct MongoServer {
    client: Client,
    address: ServerAddress,
    label: String,
    state: Arc<RwLock<ConnectionState>>,
}

#[async_trait]
impl Server for MongoServer {
    fn address(&self) -> &str {
        &self.label
    }

    async fn run_command(
        &self,
        db: &str,
        command: Document,
        session: Option<&dyn Session>,
    ) -> Result<Document> {
        ensure_open(&self.state, &self.address).await?;

        let address = self.address.clone();
        let criteria = SelectionCriteria::Predicate(Arc::new(move |info: &ServerInfo| {
            info.address() == &address
        }));
        let database = self.client.database(db);
        let action = database.run_command(command).selection_criteria(criteria);

        let mongo_session = session.and_then(|s| s.as_any().downcast_ref::<MongoSession>());
        let reply = match mongo_session {
            Some(mongo_session) => {
                let mut inner = mongo_session.inner.lock().await;
                let Some(client_session) = inner.as_mut() else {
                    return Err(CursorError::InvalidArgument(
                        "Use of expired sessions is not permitted".to_string(),
                    ));
                };
                action.session(client_session).await?
            }
            None => action.await?,
        };
        Ok(reply)
    }
}

/// A driver session that can be ended once
pub struct MongoSession {
    id: Uuid,
    inner: Mutex<Option<ClientSession>>,
    ended: AtomicBool,
}

impl MongoSession {
    pub fn new(session: ClientSession) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(Some(session)),
            ended: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for MongoSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoSession")
            .field("id", &self.id)
            .field("ended", &self.has_ended())
            .finish()
    }
}

#[async_trait]
impl Session for MongoSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn has_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    /// Dropping the driver session returns it to the client's pool, which
    /// ends it server-side.
    async fn end(&self) -> Result<()> {
        if self.ended.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let session = self.inner.lock().await.take();
        drop(session);
        debug!("Session {} ended", self.id);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
