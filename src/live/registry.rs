//! Active-query registry.
//!
//! Tracks which live queries are mounted on the page. The sync layer reads
//! the snapshot to decide whether an edit can be applied in place or needs
//! a full revalidation.
//!
//! Flips and their notifications are serialized, so listeners observe
//! snapshot changes in the order they happened. Listeners run while that
//! ordering lock is held and must not register or unregister queries.

use std::{
    collections::{BTreeMap, HashSet},
    fmt,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use once_cell::sync::Lazy;
use tracing::trace;

use crate::cache::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "vitrine::live::registry";

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

static GLOBAL: Lazy<ActiveQueryRegistry> = Lazy::new(ActiveQueryRegistry::new);

#[derive(Default)]
struct Inner {
    active: RwLock<HashSet<String>>,
    /// Held across a membership change and its notification.
    ordering: Mutex<()>,
    listeners: RwLock<BTreeMap<u64, Listener>>,
    next_listener: AtomicU64,
}

/// Set of live query ids with change notification.
#[derive(Clone, Default)]
pub struct ActiveQueryRegistry {
    inner: Arc<Inner>,
}

impl fmt::Debug for ActiveQueryRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveQueryRegistry")
            .field("active", &rw_read(&self.inner.active, SOURCE, "debug").len())
            .finish()
    }
}

impl ActiveQueryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry shared by the whole process.
    pub fn global() -> &'static ActiveQueryRegistry {
        &GLOBAL
    }

    /// True iff at least one query id is registered.
    pub fn snapshot(&self) -> bool {
        !rw_read(&self.inner.active, SOURCE, "snapshot").is_empty()
    }

    pub fn register(&self, id: impl Into<String>) -> QueryRegistration {
        let id = id.into();
        let _ordering = mutex_lock(&self.inner.ordering, SOURCE, "register");
        let flipped = {
            let mut active = rw_write(&self.inner.active, SOURCE, "register");
            let was_empty = active.is_empty();
            active.insert(id.clone());
            was_empty
        };
        trace!(target = SOURCE, query = %id, "live query registered");
        if flipped {
            self.notify(true);
        }
        QueryRegistration {
            registry: self.clone(),
            id,
            registered: true,
        }
    }

    /// Call `listener` with the new snapshot each time it flips.
    pub fn subscribe(&self, listener: impl Fn(bool) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        rw_write(&self.inner.listeners, SOURCE, "subscribe").insert(id, Arc::new(listener));
        Subscription {
            registry: self.clone(),
            id,
            subscribed: true,
        }
    }

    fn unregister(&self, id: &str) {
        let _ordering = mutex_lock(&self.inner.ordering, SOURCE, "unregister");
        let flipped = {
            let mut active = rw_write(&self.inner.active, SOURCE, "unregister");
            active.remove(id) && active.is_empty()
        };
        trace!(target = SOURCE, query = %id, "live query unregistered");
        if flipped {
            self.notify(false);
        }
    }

    fn notify(&self, snapshot: bool) {
        let listeners: Vec<Listener> = rw_read(&self.inner.listeners, SOURCE, "notify")
            .values()
            .cloned()
            .collect();
        for listener in listeners {
            listener(snapshot);
        }
    }
}

/// Handle for one registered query id. Unregisters on drop.
#[must_use = "dropping the registration unregisters the query"]
pub struct QueryRegistration {
    registry: ActiveQueryRegistry,
    id: String,
    registered: bool,
}

impl QueryRegistration {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Safe to call more than once.
    pub fn unregister(&mut self) {
        if std::mem::take(&mut self.registered) {
            self.registry.unregister(&self.id);
        }
    }
}

impl Drop for QueryRegistration {
    fn drop(&mut self) {
        self.unregister();
    }
}

/// Listener handle. Unsubscribes on drop.
#[must_use = "dropping the subscription removes the listener"]
pub struct Subscription {
    registry: ActiveQueryRegistry,
    id: u64,
    subscribed: bool,
}

impl Subscription {
    pub fn unsubscribe(&mut self) {
        if std::mem::take(&mut self.subscribed) {
            rw_write(&self.registry.inner.listeners, SOURCE, "unsubscribe").remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
