//! Session handles borrowed from an engine's pool

use bb8::{ManageConnection, PooledConnection};
use std::fmt;
use std::ops::{Deref, DerefMut};
use uuid::Uuid;

/// One unit of work's access to the database.
///
/// Wraps an owned pooled connection, so the session can outlive the borrow
/// of the engine that produced it. Dropping it returns the connection to the
/// pool. Values read through it are plain owned data and stay usable after a
/// transaction commits.
pub struct Session<M: ManageConnection> {
    id: Uuid,
    conn: PooledConnection<'static, M>,
}

impl<M: ManageConnection> Session<M> {
    pub(crate) fn new(conn: PooledConnection<'static, M>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conn,
        }
    }

    /// Unique identifier of this handle
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl<M: ManageConnection> Deref for Session<M> {
    type Target = M::Connection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<M: ManageConnection> DerefMut for Session<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<M: ManageConnection> fmt::Debug for Session<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish()
    }
}
