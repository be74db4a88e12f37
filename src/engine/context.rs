//! Execution identities and operation contexts
//!
//! A `Client` is the engine-level identity of whoever is running storage
//! work. The engine binds it to the thread that attached it; work that
//! requires a client (index builds) must run on that thread.
//!
//! An `OperationContext` wraps a client with cancellation: a kill flag that
//! can be flipped from anywhere through a `KillHandle`, plus an optional
//! deadline. Long-running loops poll `check_for_interrupt` between steps.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ClientId, StorageEngine};
use crate::errors::{StorageError, StorageResult};

/// Engine-registered execution identity, detached on drop
pub struct Client {
    id: ClientId,
    description: String,
    engine: Arc<dyn StorageEngine>,
}

impl Client {
    /// Attach a new client to the calling thread
    pub fn attach(engine: Arc<dyn StorageEngine>, description: impl Into<String>) -> Self {
        let description = description.into();
        let id = engine.attach_client(&description);
        Self {
            id,
            description,
            engine,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Whether work on the current thread may run under this client
    pub fn is_attached_to_current_thread(&self) -> bool {
        self.engine.client_thread(self.id) == Some(std::thread::current().id())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.engine.detach_client(self.id);
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id)
            .field("description", &self.description)
            .finish()
    }
}

/// Cancels the operation context it was taken from
#[derive(Debug, Clone, Default)]
pub struct KillHandle(Arc<AtomicBool>);

impl KillHandle {
    pub fn kill(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_killed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-supplied execution context for one storage operation or a
/// sequence of them
#[derive(Debug)]
pub struct OperationContext {
    client: Client,
    kill: KillHandle,
    deadline: Option<Instant>,
}

impl OperationContext {
    /// New context with its own client attached to the calling thread
    pub fn new(engine: &Arc<dyn StorageEngine>, description: impl Into<String>) -> Self {
        Self {
            client: Client::attach(Arc::clone(engine), description),
            kill: KillHandle::default(),
            deadline: None,
        }
    }

    /// Fail with `ExceededTimeLimit` once `limit` has elapsed
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.deadline = Some(Instant::now() + limit);
        self
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    /// Returns an error if the operation was killed or its deadline passed
    pub fn check_for_interrupt(&self) -> StorageResult<()> {
        if self.kill.is_killed() {
            return Err(StorageError::interrupted("operation was interrupted"));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(StorageError::exceeded_time_limit("operation exceeded time limit"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::memory::MemoryEngine;
    use crate::errors::ErrorCode;

    fn engine() -> Arc<dyn StorageEngine> {
        Arc::new(MemoryEngine::new())
    }

    #[test]
    fn test_client_bound_to_creating_thread() {
        let engine = engine();
        let client = Client::attach(Arc::clone(&engine), "test");
        assert!(client.is_attached_to_current_thread());

        let on_other_thread = std::thread::scope(|s| {
            s.spawn(|| client.is_attached_to_current_thread()).join().unwrap()
        });
        assert!(!on_other_thread);
    }

    #[test]
    fn test_client_detached_on_drop() {
        let engine = engine();
        let client = Client::attach(Arc::clone(&engine), "test");
        let id = client.id();
        assert!(engine.client_thread(id).is_some());
        drop(client);
        assert!(engine.client_thread(id).is_none());
    }

    #[test]
    fn test_kill_interrupts() {
        let ctx = OperationContext::new(&engine(), "test");
        assert!(ctx.check_for_interrupt().is_ok());
        ctx.kill_handle().kill();
        assert_eq!(ctx.check_for_interrupt().unwrap_err().code(), ErrorCode::Interrupted);
    }

    #[test]
    fn test_deadline_interrupts() {
        let ctx = OperationContext::new(&engine(), "test").with_time_limit(Duration::ZERO);
        assert_eq!(
            ctx.check_for_interrupt().unwrap_err().code(),
            ErrorCode::ExceededTimeLimit
        );
    }
}
