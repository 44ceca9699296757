//! Domain model (IDs, history entries, analysis results, notifications, events).

pub mod analysis;
pub mod entry;
pub mod events;
pub mod ids;
pub mod notification;

pub use analysis::{AnalysisMode, AnalysisResult, Detection};
pub use entry::{DEFAULT_ENTRY_TITLE, EntrySummary, HistoryEntry, Payload};
pub use events::HistoryChanged;
pub use ids::{EntryId, ToastId};
pub use notification::{DEFAULT_TOAST_DURATION, NotificationMessage, Severity};
