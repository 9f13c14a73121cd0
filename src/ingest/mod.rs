pub mod pipeline;
pub mod store;

pub use pipeline::{InboundCall, IngestError, IngestOutcome, ingest};
pub use store::{
    EventCursor, EventRecord, ListEventsParams, ListEventsResult, NewEvent, StoreError, get_event,
    insert_event, list_events,
};
