//! Change notifier: the single `on_change` seam for history views.
//!
//! Two delivery paths feed it:
//! - the storage bridge installed by `HistoryStore`: every successful write to
//!   the key, through this storage handle (other views in the same window) or
//!   through another handle (other windows);
//! - a direct broadcast after each local mutation, used only when the storage
//!   adapter has no `watch` channel.
//!
//! Observers cannot tell the two apart, and do not need to.

use crate::domain::HistoryChanged;
use crate::observer::{ObserverSet, Subscription};

#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    observers: ObserverSet<HistoryChanged>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription
    where
        F: Fn(&HistoryChanged) + Send + Sync + 'static,
    {
        self.observers.subscribe(observer)
    }

    pub(crate) fn broadcast(&self) -> usize {
        self.observers.emit(&HistoryChanged)
    }
}
