use sessionlens_types::NotificationEntry;

/// Events published by the coordinator. Subscribers are the only bridge
/// to view code.
#[derive(Debug, Clone)]
pub enum ViewerEvent {
    ProjectsLoaded,
    SessionsLoaded {
        project_id: String,
    },
    /// Full load completed; at most one per load.
    ConversationLoaded {
        session_id: String,
    },
    /// Incremental update; never reorders earlier chunks.
    ConversationUpdated {
        session_id: String,
    },
    ConversationLoadFailed {
        session_id: String,
    },
    /// Fired only on ongoing/idle transitions.
    SessionActivityChanged {
        session_id: String,
        is_ongoing: bool,
    },
    NotificationFired(NotificationEntry),
}
