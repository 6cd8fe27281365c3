//! Store event boundary.
//!
//! Schema lifecycle code MUST NOT log directly for lifecycle milestones;
//! it emits [`StoreEvent`]s through the configured [`EventSink`]. The
//! default sink writes structured log lines; applications that need to
//! observe migrations inject their own sink at construction.

use tracing::info;

///
/// StoreEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreEvent {
    /// The schema record was created for the first time.
    DidCreate,

    /// Emitted once, before the first actual schema mutation of an
    /// initialisation run.
    WillMigrate,

    /// Emitted once per initialisation run that mutated the schema.
    DidMigrate,
}

///
/// EventSink
///

pub trait EventSink: Send + Sync {
    fn emit(&self, event: StoreEvent);
}

///
/// LogSink
/// Default sink: forwards events to the log.
///

pub(crate) struct LogSink {
    pub store: String,
}

impl EventSink for LogSink {
    fn emit(&self, event: StoreEvent) {
        match event {
            StoreEvent::DidCreate => info!(store = %self.store, "document store created"),
            StoreEvent::WillMigrate => info!(store = %self.store, "schema migration starting"),
            StoreEvent::DidMigrate => info!(store = %self.store, "schema migration finished"),
        }
    }
}
