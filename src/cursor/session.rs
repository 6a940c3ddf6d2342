use std::sync::Arc;

use tracing::debug;

use crate::error::Result;
use crate::topology::Session;

/// Whether a cursor is responsible for ending the session it uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOwnership {
    /// Created implicitly by the cursor; ended by the cursor.
    Owned,
    /// Supplied by the caller; never ended by the cursor.
    Borrowed,
}

/// A session attached to a cursor, tagged with its ownership.
///
/// The tag is fixed when the session is attached. `release` ends an owned
/// session at most once.
#[derive(Debug)]
pub(crate) struct CursorSession {
    session: Arc<dyn Session>,
    ownership: SessionOwnership,
    released: bool,
}

impl CursorSession {
    pub(crate) fn owned(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            ownership: SessionOwnership::Owned,
            released: false,
        }
    }

    pub(crate) fn borrowed(session: Arc<dyn Session>) -> Self {
        Self {
            session,
            ownership: SessionOwnership::Borrowed,
            released: false,
        }
    }

    pub(crate) fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub(crate) fn ownership(&self) -> SessionOwnership {
        self.ownership
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released
    }

    /// End the session if the cursor owns it and has not ended it yet.
    ///
    /// Returns `true` when this call ended the session. The session counts as
    /// released even if `end` fails; it is never ended twice.
    pub(crate) async fn release(&mut self) -> Result<bool> {
        if self.ownership == SessionOwnership::Borrowed || self.released {
            return Ok(false);
        }
        self.released = true;

        debug!("Ending implicit session {}", self.session.id());
        self.session.end().await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockSession;

    #[tokio::test]
    async fn test_owned_session_released_once() {
        let session = Arc::new(MockSession::new());
        let mut attached = CursorSession::owned(session.clone());

        assert!(attached.release().await.unwrap());
        assert!(!attached.release().await.unwrap());
        assert_eq!(session.end_count(), 1);
        assert!(attached.is_released());
    }

    #[tokio::test]
    async fn test_borrowed_session_never_ended() {
        let session = Arc::new(MockSession::new());
        let mut attached = CursorSession::borrowed(session.clone());

        assert!(!attached.release().await.unwrap());
        assert_eq!(session.end_count(), 0);
        assert_eq!(attached.ownership(), SessionOwnership::Borrowed);
    }

    #[tokio::test]
    async fn test_failed_end_is_not_retried() {
        let session = Arc::new(MockSession::failing());
        let mut attached = CursorSession::owned(session.clone());

        assert!(attached.release().await.is_err());
        assert!(!attached.release().await.unwrap());
        assert_eq!(session.end_count(), 1);
    }
}
