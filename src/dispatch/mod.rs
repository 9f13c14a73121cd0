mod config;
pub mod sender;
pub mod store;

pub use config::DeliveryConfig;
pub use sender::{DeliveryOutcome, OutboundRequest, build_headers, build_test_headers, send};
pub use store::{NewAttempt, StoreError, finalize_attempt, insert_attempt, list_attempts_for_event};
