//! Key → handler registry for inbound pushes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::Context;

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
type Handler = Arc<dyn Fn(Context) -> BoxFuture + Send + Sync + 'static>;

/// Identifies one registration, for `off`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handlers per key, kept in registration order.
#[derive(Default)]
pub struct Router {
    handlers: Mutex<HashMap<String, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F, Fut>(&self, key: impl Into<String>, handler: F) -> HandlerId
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handler: Handler = Arc::new(move |ctx| Box::pin(handler(ctx)));
        self.lock().entry(key.into()).or_default().push((id, handler));
        id
    }

    /// Remove one registration; `false` if it was not found.
    pub fn off(&self, key: &str, id: HandlerId) -> bool {
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(key) else {
            return false;
        };
        let before = list.len();
        list.retain(|(h, _)| *h != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(key);
        }
        removed
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn handler_count(&self, key: &str) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }

    /// Run every handler for the context's key, one after another, on a
    /// spawned task. Returns `false` when no handler is registered.
    pub fn dispatch(&self, ctx: Context) -> bool {
        let handlers: Vec<Handler> = match self.lock().get(ctx.key()) {
            Some(list) => list.iter().map(|(_, h)| h.clone()).collect(),
            None => return false,
        };
        tokio::spawn(async move {
            for handler in handlers {
                handler(ctx.clone()).await;
            }
        });
        true
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<(HandlerId, Handler)>>> {
        // A panicking handler never holds this lock, so poisoning only
        // means a registration call panicked mid-update.
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}
