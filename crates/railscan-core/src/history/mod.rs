//! History module: persisted analysis log and its change signal.

mod notifier;
mod store;

pub use notifier::ChangeNotifier;
pub use store::{HISTORY_CAP, HISTORY_KEY, HistoryStore};
