use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::{
    auth::api_auth,
    handlers::{deliveries, endpoints, events, receiver},
    state::AppState,
};

/// Full application router. The receiver route is public (the path token is
/// the credential); everything under /api sits behind the bearer guard.
pub fn build(state: AppState) -> Router {
    let receive = get(receiver::receive_webhook)
        .post(receiver::receive_webhook)
        .put(receiver::receive_webhook)
        .patch(receiver::receive_webhook)
        .delete(receiver::receive_webhook);

    let api = Router::new()
        .route(
            "/endpoints",
            post(endpoints::create_endpoint_handler).get(endpoints::list_endpoints_handler),
        )
        .route("/endpoints/:endpoint_id", get(endpoints::get_endpoint_handler))
        .route(
            "/endpoints/:endpoint_id/rotate-secret",
            post(endpoints::rotate_secret_handler),
        )
        .route(
            "/endpoints/:endpoint_id/secret",
            get(endpoints::reveal_secret_handler),
        )
        .route(
            "/endpoints/:endpoint_id/test",
            post(endpoints::test_send_handler),
        )
        .route("/events", get(events::list_events_handler))
        .route("/events/:event_id", get(events::get_event_handler))
        .route(
            "/events/:event_id/attempts",
            get(events::list_attempts_handler),
        )
        .route(
            "/events/:event_id/replay",
            post(deliveries::replay_event_handler),
        )
        .route(
            "/events/:event_id/forward",
            post(deliveries::forward_event_handler),
        )
        .layer(middleware::from_fn_with_state(state.clone(), api_auth));

    Router::new()
        .route("/webhook/:path_token", receive)
        .nest("/api", api)
        .with_state(state)
}
