mod activity;
mod config;
mod coordinator;
mod events;
mod notifications;
mod regex_guard;
mod search;
mod watcher;

pub use activity::ActivityTracker;
pub use config::RuntimeConfig;
pub use coordinator::SessionCoordinator;
pub use events::ViewerEvent;
pub use notifications::{LogSink, NotificationMatcher, NotificationSink};
pub use regex_guard::{compile_pattern, validate_pattern};
pub use search::SearchEngine;
pub use watcher::{FileWatcher, WatchEvent};
