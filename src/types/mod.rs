pub mod api_error;
pub mod delivery;
pub mod endpoint;
pub mod event;
pub mod owner;
pub mod receiver;

#[allow(unused_imports)]
pub use api_error::{ApiErrorCode, ApiErrorResponse};
#[allow(unused_imports)]
pub use delivery::{DeliveryAttempt, DeliveryKind, DeliveryStatus};
#[allow(unused_imports)]
pub use endpoint::{Endpoint, EndpointStatus};
#[allow(unused_imports)]
pub use event::{Event, EventStatus, EventSummary};
#[allow(unused_imports)]
pub use owner::{
    CreateEndpointRequest, CreateEndpointResponse, GetEndpointResponse, GetEventResponse,
    ListAttemptsResponse, ListEndpointsResponse, ListEventsResponse, RelayResponse,
    RelayTargetRequest, RevealSecretResponse, RotateSecretResponse, TestSendResponse,
};
#[allow(unused_imports)]
pub use receiver::{IngestAccepted, IngestRejected};
