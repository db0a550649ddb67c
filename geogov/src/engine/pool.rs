//! Bounded pool of engine connections.
//!
//! Capacity is enforced with a semaphore: at most `size` connections exist
//! at once, and an acquire that cannot get a permit within the configured
//! timeout returns `PoolExhausted` instead of queuing unboundedly. The
//! guard returns its connection on drop, including on cancellation paths,
//! so a timed-out request can never leak capacity.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::{EngineConnector, SpatialEngine};
use crate::errors::{GovError, GovResult};

pub struct EnginePool {
    connector: Arc<dyn EngineConnector>,
    semaphore: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Box<dyn SpatialEngine>>>>,
    acquire_timeout: Duration,
    size: usize,
}

impl EnginePool {
    pub fn new(connector: Arc<dyn EngineConnector>, size: usize, acquire_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            connector,
            semaphore: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(size))),
            acquire_timeout,
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits currently free; equals `size` when the pool is fully idle.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Acquire a connection, waiting at most the configured timeout for
    /// capacity. Connections are created lazily on first use.
    pub async fn acquire(&self) -> GovResult<PooledEngine> {
        let permit = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.semaphore).acquire_owned(),
        )
        .await
        .map_err(|_| GovError::PoolExhausted)?
        .map_err(|_| GovError::Internal("engine pool is closed".to_string()))?;

        let reused = {
            let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
            idle.pop()
        };

        // A failed connect drops the permit with `?`, releasing capacity.
        let engine = match reused {
            Some(engine) => engine,
            None => self.connector.connect().await?,
        };

        Ok(PooledEngine {
            engine: Some(engine),
            idle: Arc::clone(&self.idle),
            defunct: false,
            _permit: permit,
        })
    }
}

/// RAII guard over one pooled connection. Dropping the guard returns the
/// connection to the free list unless it was marked defunct.
pub struct PooledEngine {
    engine: Option<Box<dyn SpatialEngine>>,
    idle: Arc<Mutex<Vec<Box<dyn SpatialEngine>>>>,
    defunct: bool,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledEngine")
            .field("engine", &self.engine.is_some())
            .field("defunct", &self.defunct)
            .finish()
    }
}

impl PooledEngine {
    pub fn engine_mut(&mut self) -> &mut dyn SpatialEngine {
        self.engine
            .as_mut()
            .expect("connection present until drop")
            .as_mut()
    }

    pub fn engine_id(&self) -> String {
        self.engine
            .as_ref()
            .map(|e| e.engine_id().to_string())
            .unwrap_or_default()
    }

    /// Mark the connection broken; it will be discarded instead of reused.
    pub fn discard(&mut self) {
        self.defunct = true;
    }
}

impl Drop for PooledEngine {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.take() {
            if !self.defunct {
                let mut idle = self.idle.lock().unwrap_or_else(|e| e.into_inner());
                idle.push(engine);
            }
        }
        // The permit drops after this, freeing capacity for the next waiter.
    }
}
