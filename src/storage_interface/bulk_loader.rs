//! Bulk collection loading
//!
//! A loader owns a freshly created collection whose indexes are registered
//! but unfinished. Documents are appended without per-document index
//! maintenance; `commit` builds every index in one pass.
//!
//! A loader that is not committed tears itself down: the unfinished
//! indexes (the `_id` index included) are discarded, the collection and
//! its documents stay. A loader may be filled, committed or torn down on
//! any thread. The engine only accepts index-build calls from a client
//! attached to the calling thread, so when the loader's own client belongs
//! to another thread a transient client is attached for the duration of
//! the call.
//!
//! Lifecycle:
//!
//! ```text
//! create ──> insert_documents* ──> commit    (Committed)
//!                              └─> abandon   (Abandoned)
//!                              └─> drop      (Abandoned)
//! ```

use std::sync::Arc;

use super::lifecycle::CollectionLifecycleManager;
use crate::engine::{
    write_conflict_retry, write_conflict_retry_uninterruptible, Client, ClientId, CollectionOptions,
    IdIndexCreation, IndexBuildId, IndexSpec, KillHandle, OperationContext, StorageEngine,
};
use crate::errors::StorageResult;
use crate::observability::{log_event, Event, Logger};
use crate::types::{Document, Namespace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoaderState {
    Active,
    Committed,
    Abandoned,
}

/// Execution identity for one engine call: the loader's own client when
/// still on its thread, otherwise one attached just for that call
enum LoaderClient<'a> {
    Borrowed(&'a Client),
    Transient(Client),
}

impl LoaderClient<'_> {
    fn id(&self) -> ClientId {
        match self {
            LoaderClient::Borrowed(client) => client.id(),
            LoaderClient::Transient(client) => client.id(),
        }
    }
}

/// Exclusive loading session for one new collection
pub struct BulkCollectionLoader {
    engine: Arc<dyn StorageEngine>,
    ns: Namespace,
    ctx: OperationContext,
    builds: Vec<IndexBuildId>,
    state: LoaderState,
    inserted: u64,
}

impl BulkCollectionLoader {
    /// Create `ns` and register its indexes as unfinished builds.
    ///
    /// Fails with `NamespaceExists` if the collection is already there. If
    /// the builds cannot be registered the new collection is dropped again.
    pub fn create(
        lifecycle: &CollectionLifecycleManager,
        ns: &Namespace,
        options: &CollectionOptions,
        id_index_spec: Option<IndexSpec>,
        secondary_index_specs: Vec<IndexSpec>,
    ) -> StorageResult<Self> {
        let engine = Arc::clone(lifecycle.engine());
        let ctx = OperationContext::new(&engine, format!("bulk loader for {}", ns));
        lifecycle.create(&ctx, ns, options, IdIndexCreation::Deferred)?;

        let specs: Vec<IndexSpec> = id_index_spec.into_iter().chain(secondary_index_specs).collect();
        let builds = match engine.begin_index_builds(ctx.client().id(), ns, &specs) {
            Ok(builds) => builds,
            Err(e) => {
                if let Err(drop_err) = engine.drop_collection(ns) {
                    Logger::error(
                        Event::BulkLoadAbandon.as_str(),
                        &[("ns", &ns.to_string()), ("reason", &drop_err.to_string())],
                    );
                }
                return Err(e);
            }
        };
        log_event(
            Event::BulkLoadBegin,
            &[("indexes", &specs.len().to_string()), ("ns", &ns.to_string())],
        );
        Ok(Self {
            engine,
            ns: ns.clone(),
            ctx,
            builds,
            state: LoaderState::Active,
            inserted: 0,
        })
    }

    pub fn namespace(&self) -> &Namespace {
        &self.ns
    }

    /// Documents appended so far
    pub fn inserted_count(&self) -> u64 {
        self.inserted
    }

    /// Kill handle of the loader's own operation context
    pub fn kill_handle(&self) -> KillHandle {
        self.ctx.kill_handle()
    }

    /// Append documents and feed them to the pending index builds.
    /// Duplicate `_id` values are accepted here.
    pub fn insert_documents<I>(&mut self, docs: I) -> StorageResult<()>
    where
        I: IntoIterator<Item = Document>,
    {
        let docs: Vec<Document> = docs.into_iter().collect();
        if docs.is_empty() {
            return Ok(());
        }
        let client = self.client("insert");
        let inserted = write_conflict_retry(&self.ctx, "bulkLoaderInsertDocuments", &self.ns, || {
            self.engine.bulk_insert(client.id(), &self.ns, &self.builds, &docs)
        })?;
        drop(client);
        self.inserted += inserted;
        Ok(())
    }

    /// Build every pending index and end the session. A unique index keeps
    /// the first document per key. If commit fails the loader is torn down.
    pub fn commit(mut self) -> StorageResult<()> {
        let client = self.client("commit");
        write_conflict_retry(&self.ctx, "bulkLoaderCommit", &self.ns, || {
            self.engine.commit_index_builds(client.id(), &self.ns, &self.builds)
        })?;
        drop(client);
        self.state = LoaderState::Committed;
        log_event(
            Event::BulkLoadCommit,
            &[("documents", &self.inserted.to_string()), ("ns", &self.ns.to_string())],
        );
        Ok(())
    }

    /// End the session without committing, discarding unfinished indexes
    pub fn abandon(mut self) -> StorageResult<()> {
        self.teardown()
    }

    fn teardown(&mut self) -> StorageResult<()> {
        if self.state != LoaderState::Active {
            return Ok(());
        }
        self.state = LoaderState::Abandoned;

        let client = self.client("teardown");
        let result = write_conflict_retry_uninterruptible("bulkLoaderAbandon", &self.ns, || {
            self.engine.abort_index_builds(client.id(), &self.ns, &self.builds)
        });
        drop(client);
        match &result {
            Ok(()) => log_event(
                Event::BulkLoadAbandon,
                &[("documents", &self.inserted.to_string()), ("ns", &self.ns.to_string())],
            ),
            Err(e) => Logger::error(
                Event::BulkLoadAbandon.as_str(),
                &[("ns", &self.ns.to_string()), ("reason", &e.to_string())],
            ),
        }
        result
    }

    fn client(&self, purpose: &str) -> LoaderClient<'_> {
        if self.ctx.client().is_attached_to_current_thread() {
            return LoaderClient::Borrowed(self.ctx.client());
        }
        log_event(
            Event::TransientClientAttached,
            &[("ns", &self.ns.to_string()), ("purpose", purpose)],
        );
        LoaderClient::Transient(Client::attach(
            Arc::clone(&self.engine),
            format!("bulk loader {} for {}", purpose, self.ns),
        ))
    }
}

impl Drop for BulkCollectionLoader {
    fn drop(&mut self) {
        // Failures are already logged by teardown.
        let _ = self.teardown();
    }
}

impl std::fmt::Debug for BulkCollectionLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkCollectionLoader")
            .field("ns", &self.ns)
            .field("state", &self.state)
            .field("indexes", &self.builds.len())
            .field("inserted", &self.inserted)
            .finish()
    }
}
