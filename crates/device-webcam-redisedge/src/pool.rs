//! Bounded pool of idle RedisEdge connections.
//!
//! Connections are dialled lazily on [`Pool::acquire`] and handed back when
//! the returned [`PooledConnection`] is dropped. Only `max_idle` connections
//! are kept around, and an idle connection older than the idle timeout is
//! closed rather than reused.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::PoolOptions;
use crate::connection::{Connector, EdgeConnection};
use crate::error::{RedisEdgeError, Result};

struct IdleConnection<T> {
    conn: T,
    returned_at: Instant,
}

pub struct Pool<C: Connector> {
    connector: C,
    max_idle: usize,
    idle_timeout: Option<Duration>,
    // Oldest connection at the front.
    idle: Mutex<VecDeque<IdleConnection<C::Connection>>>,
    closed: AtomicBool,
}

impl<C: Connector> Pool<C> {
    pub fn new(connector: C, options: &PoolOptions) -> Self {
        Self {
            connector,
            max_idle: options.max_idle,
            idle_timeout: options.idle_timeout(),
            idle: Mutex::new(VecDeque::with_capacity(options.max_idle)),
            closed: AtomicBool::new(false),
        }
    }

    /// Reuses the most recently returned idle connection, or dials a new one.
    ///
    /// Dial failures are returned as-is; the pool never retries.
    pub async fn acquire(&self) -> Result<PooledConnection<'_, C>> {
        if self.is_closed() {
            return Err(RedisEdgeError::Connectivity(
                "connection pool is closed".to_string(),
            ));
        }

        let conn = match self.take_idle() {
            Some(conn) => conn,
            None => self.connector.connect().await?,
        };

        Ok(PooledConnection {
            pool: self,
            conn: Some(conn),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drops every idle connection. Connections still checked out are closed
    /// when their guards are dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let drained = {
            let mut idle = self.idle.lock();
            idle.drain(..).count()
        };
        debug!(drained, "closed RedisEdge connection pool");
    }

    fn take_idle(&self) -> Option<C::Connection> {
        let mut idle = self.idle.lock();

        if let Some(timeout) = self.idle_timeout {
            while idle
                .front()
                .is_some_and(|entry| entry.returned_at.elapsed() >= timeout)
            {
                idle.pop_front();
            }
        }

        idle.pop_back().map(|entry| entry.conn)
    }

    fn release(&self, conn: C::Connection) {
        if self.is_closed() || conn.is_broken() {
            return;
        }

        let mut idle = self.idle.lock();
        idle.push_back(IdleConnection {
            conn,
            returned_at: Instant::now(),
        });
        while idle.len() > self.max_idle {
            idle.pop_front();
        }
    }
}

/// A connection checked out of a [`Pool`]; returned to it on drop.
pub struct PooledConnection<'a, C: Connector> {
    pool: &'a Pool<C>,
    conn: Option<C::Connection>,
}

impl<C: Connector> Deref for PooledConnection<'_, C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("connection present until drop")
    }
}

impl<C: Connector> DerefMut for PooledConnection<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("connection present until drop")
    }
}

impl<C: Connector> Drop for PooledConnection<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.release(conn);
        }
    }
}
