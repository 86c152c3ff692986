//! [`ChangeNotifier`]: topic-keyed publish/subscribe for change events.
//!
//! The domain graph publishes one topic per entity kind after every committed
//! mutation. Handlers run synchronously on the publishing task, in
//! subscription order. A failing or panicking handler is logged and skipped;
//! it never affects the other handlers or the mutation that triggered it.

use std::{
  panic::{self, AssertUnwindSafe},
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::BoxError;

/// A change-event channel, one per entity kind.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
pub enum Topic {
  GroupsChanged,
  CategoriesChanged,
  SkillsChanged,
  UsersChanged,
}

/// What a handler returns. Errors are logged, not propagated.
pub type HandlerResult = Result<(), BoxError>;

type Handler = Arc<dyn Fn(Topic) -> HandlerResult + Send + Sync>;

/// Returned by [`ChangeNotifier::subscribe`]; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
  handle:  SubscriptionHandle,
  topic:   Topic,
  handler: Handler,
}

#[derive(Default)]
struct Registry {
  next_handle: u64,
  subscribers: Vec<Subscriber>,
}

/// Observer registry. Its lock is independent of the graph's write lock, so
/// handlers may subscribe or unsubscribe while a publish is in progress.
#[derive(Default)]
pub struct ChangeNotifier {
  registry: Mutex<Registry>,
}

impl std::fmt::Debug for ChangeNotifier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ChangeNotifier")
      .field("subscribers", &self.lock().subscribers.len())
      .finish()
  }
}

impl ChangeNotifier {
  pub fn new() -> Self { Self::default() }

  // A panicking handler never runs under this lock, but recover anyway.
  fn lock(&self) -> MutexGuard<'_, Registry> {
    self.registry.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionHandle
  where
    F: Fn(Topic) -> HandlerResult + Send + Sync + 'static,
  {
    let mut registry = self.lock();
    registry.next_handle += 1;
    let handle = SubscriptionHandle(registry.next_handle);
    registry.subscribers.push(Subscriber { handle, topic, handler: Arc::new(handler) });
    handle
  }

  /// Remove a subscription. Returns whether anything was removed; removing a
  /// handle twice is harmless.
  pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
    let mut registry = self.lock();
    let before = registry.subscribers.len();
    registry.subscribers.retain(|s| s.handle != handle);
    registry.subscribers.len() != before
  }

  pub fn subscriber_count(&self, topic: Topic) -> usize {
    self.lock().subscribers.iter().filter(|s| s.topic == topic).count()
  }

  /// Invoke every handler currently subscribed to `topic`. Returns how many
  /// handlers completed successfully.
  pub fn publish(&self, topic: Topic) -> usize {
    // Snapshot so handlers can touch the registry without deadlocking.
    let handlers: Vec<(SubscriptionHandle, Handler)> = self
      .lock()
      .subscribers
      .iter()
      .filter(|s| s.topic == topic)
      .map(|s| (s.handle, Arc::clone(&s.handler)))
      .collect();

    let mut delivered = 0;
    for (handle, handler) in handlers {
      match panic::catch_unwind(AssertUnwindSafe(|| handler(topic))) {
        Ok(Ok(())) => delivered += 1,
        Ok(Err(e)) => {
          tracing::warn!(%topic, ?handle, error = %e, "change handler failed");
        }
        Err(_) => {
          tracing::error!(%topic, ?handle, "change handler panicked");
        }
      }
    }
    delivered
  }
}
