//! Per-user session registry. For any username at most one
//! [`CollectionStore`] is open across all request handlers, and requests from
//! the same user are serialized by holding the entry's async mutex for the
//! whole lease. Cross-user requests never contend: each user has their own
//! file and their own entry.

use crate::clock::Clock;
use crate::collection::{CollectionStore, StoreOptions};
use crate::context::RequestContext;
use crate::{Error, LibraryError, SessionErrorKind};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// How long `invalidate` waits for the entry to go idle.
const INVALIDATE_DEADLINE: Duration = Duration::from_secs(30);

/// Identifies one user's collection on disk.
#[derive(Clone, Debug)]
pub struct CollectionRef {
    pub username: String,
    pub path: PathBuf,
}

#[derive(Clone, Copy, Debug)]
pub struct RegistryOptions {
    /// Idle time before `sweep` closes a session.
    pub ttl: Duration,
    pub store: StoreOptions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            store: StoreOptions::default(),
        }
    }
}

struct StoreSlot {
    store: Option<CollectionStore>,
    /// Set when the entry leaves the map; waiters that obtain the guard
    /// afterwards must retry against a fresh entry instead of re-opening the
    /// file through a dead slot.
    evicted: bool,
    /// Committed writes not yet checkpointed into the main file.
    dirty: bool,
}

struct SessionEntry {
    username: String,
    slot: Arc<AsyncMutex<StoreSlot>>,
    last_access_ms: AtomicI64,
    in_use: AtomicUsize,
}

pub struct SessionRegistry {
    entries: Mutex<HashMap<String, Arc<SessionEntry>>>,
    options: RegistryOptions,
    clock: Arc<dyn Clock>,
}

/// Exclusive access to one user's open collection. Holding the lease *is* the
/// per-user lock; drop it as soon as the operation is done.
pub struct Lease {
    entry: Arc<SessionEntry>,
    guard: OwnedMutexGuard<StoreSlot>,
    dirty: AtomicBool,
    clock: Arc<dyn Clock>,
}

impl Lease {
    pub fn store(&self) -> &CollectionStore {
        self.guard
            .store
            .as_ref()
            .expect("a live lease always holds an open store")
    }

    /// Records that this lease committed writes; a WAL checkpoint is
    /// scheduled once the entry goes idle.
    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let dirty = self.dirty.load(Ordering::SeqCst);
        if dirty {
            self.guard.dirty = true;
        }
        self.entry
            .last_access_ms
            .store(self.clock.now_ms(), Ordering::SeqCst);
        let remaining = self.entry.in_use.fetch_sub(1, Ordering::SeqCst) - 1;
        if dirty && remaining == 0 {
            // Flush asynchronously; the task parks on the slot lock until
            // this guard is released a moment later.
            let slot = self.entry.slot.clone();
            let username = self.entry.username.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let mut guard = slot.lock().await;
                    if !guard.dirty {
                        return;
                    }
                    if let Some(store) = guard.store.as_ref() {
                        match store.checkpoint().await {
                            Ok(()) => guard.dirty = false,
                            Err(e) => {
                                log::warn!("scheduled flush failed for {}: {}", username, e);
                            }
                        }
                    }
                });
            }
        }
    }
}

impl SessionRegistry {
    pub fn new(options: RegistryOptions, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            options,
            clock,
        }
    }

    /// Waits for the user's entry, opening the store on first use. Blocks
    /// only on the per-entry lock; honors the context deadline while parked.
    pub async fn acquire(
        &self,
        ctx: &RequestContext,
        coll: &CollectionRef,
    ) -> Result<Lease, Error> {
        loop {
            let entry = self.entry_for(&coll.username);
            let mut guard = ctx.run(entry.slot.clone().lock_owned()).await?;
            if guard.evicted {
                // Lost a race against sweep/invalidate; the map no longer
                // holds this entry.
                continue;
            }
            if guard.store.is_none() {
                match CollectionStore::open(&coll.path, self.options.store).await {
                    Ok(store) => guard.store = Some(store),
                    Err(err) => {
                        guard.evicted = true;
                        drop(guard);
                        self.remove_entry(&coll.username, &entry);
                        return Err(err);
                    }
                }
            }
            entry.in_use.fetch_add(1, Ordering::SeqCst);
            entry
                .last_access_ms
                .store(self.clock.now_ms(), Ordering::SeqCst);
            return Ok(Lease {
                entry,
                guard,
                dirty: AtomicBool::new(false),
                clock: self.clock.clone(),
            });
        }
    }

    /// Explicit counterpart of dropping the lease.
    pub fn release(&self, lease: Lease, dirty: bool) {
        if dirty {
            lease.mark_dirty();
        }
        drop(lease);
    }

    /// Synchronous checkpoint: committed writes are in the main file when
    /// this returns.
    pub async fn flush(&self, ctx: &RequestContext, username: &str) -> Result<(), Error> {
        let entry = {
            let entries = self.entries.lock().expect("registry map lock");
            entries.get(username).cloned()
        };
        let Some(entry) = entry else {
            return Ok(());
        };
        let mut guard = ctx.run(entry.slot.clone().lock_owned()).await?;
        if let Some(store) = guard.store.as_ref() {
            store.checkpoint().await?;
            guard.dirty = false;
        }
        Ok(())
    }

    /// Closes sessions idle past the TTL. Entries whose lock is held (or
    /// waited on) are skipped and picked up by a later sweep.
    pub async fn sweep(&self) {
        let now = self.clock.now_ms();
        let ttl_ms = self.options.ttl.as_millis() as i64;
        let mut closing = Vec::new();
        {
            let mut entries = self.entries.lock().expect("registry map lock");
            entries.retain(|_, entry| {
                if entry.in_use.load(Ordering::SeqCst) > 0 {
                    return true;
                }
                if now - entry.last_access_ms.load(Ordering::SeqCst) <= ttl_ms {
                    return true;
                }
                let Ok(mut guard) = entry.slot.clone().try_lock_owned() else {
                    return true;
                };
                guard.evicted = true;
                if let Some(store) = guard.store.take() {
                    closing.push((entry.username.clone(), store));
                }
                false
            });
        }
        for (username, store) in closing {
            log::debug!("evicting idle session for {}", username);
            store.close().await;
        }
    }

    /// Forcibly drops the user's entry, waiting up to 30 s for it to go
    /// idle. The next request re-opens the file from scratch.
    pub async fn invalidate(&self, username: &str) -> Result<(), Error> {
        let deadline = tokio::time::Instant::now() + INVALIDATE_DEADLINE;
        loop {
            let entry = {
                let entries = self.entries.lock().expect("registry map lock");
                entries.get(username).cloned()
            };
            let Some(entry) = entry else {
                return Ok(());
            };
            if let Ok(mut guard) = entry.slot.clone().try_lock_owned() {
                guard.evicted = true;
                let store = guard.store.take();
                drop(guard);
                self.remove_entry(username, &entry);
                if let Some(store) = store {
                    store.close().await;
                }
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Library(LibraryError::Session(
                    SessionErrorKind::EvictionTimeout,
                )));
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Open sessions, for observability and tests.
    pub fn session_count(&self) -> usize {
        self.entries.lock().expect("registry map lock").len()
    }

    fn entry_for(&self, username: &str) -> Arc<SessionEntry> {
        let mut entries = self.entries.lock().expect("registry map lock");
        entries
            .entry(username.to_string())
            .or_insert_with(|| {
                Arc::new(SessionEntry {
                    username: username.to_string(),
                    slot: Arc::new(AsyncMutex::new(StoreSlot {
                        store: None,
                        evicted: false,
                        dirty: false,
                    })),
                    last_access_ms: AtomicI64::new(self.clock.now_ms()),
                    in_use: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    fn remove_entry(&self, username: &str, stale: &Arc<SessionEntry>) {
        let mut entries = self.entries.lock().expect("registry map lock");
        if let Some(current) = entries.get(username) {
            if Arc::ptr_eq(current, stale) {
                entries.remove(username);
            }
        }
    }
}
