pub mod store;

pub use store::{EndpointRecord, StoreError, find_by_token, get_endpoint, touch_last_used};
