pub mod verified;
pub mod verify;

use aide::axum::{
    routing::{get, post},
    ApiRouter,
};

/// Mini-app routes. Handlers taking `AuthenticatedUser` require a session.
pub fn handler() -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/miniapp/verify/wallet/request",
            post(verify::create_request).get(verify::get_request),
        )
        .api_route("/miniapp/verify/wallet/polling", get(verify::polling))
        .api_route("/miniapp/verify/wallet/proof", post(verify::submit_proof))
        .api_route("/miniapp/verified/wallet/list", get(verified::list))
        .api_route("/miniapp/verified/wallet/{request_id}", get(verified::get_request))
}
