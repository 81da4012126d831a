use salvo::prelude::*;
use serde_json::json;

use crate::bridge::BridgeError;
use crate::bridge::listener::ListenerError;
use crate::bridge::routing::RouteError;

pub mod health;
pub mod listener;
pub mod logs;
pub mod routes;

pub(crate) fn render_error(res: &mut Response, status: StatusCode, message: &str) {
    res.status_code(status);
    res.render(Json(json!({ "error": message })));
}

pub(crate) fn error_status(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::Route(RouteError::InvalidHandle(_) | RouteError::NoDestinations) => {
            StatusCode::BAD_REQUEST
        }
        BridgeError::Route(RouteError::Duplicate { .. }) => StatusCode::CONFLICT,
        BridgeError::Route(RouteError::NotFound(_)) => StatusCode::NOT_FOUND,
        BridgeError::Listener(
            ListenerError::MissingCredentials
            | ListenerError::IncompleteCredentials(_)
            | ListenerError::MissingSession
            | ListenerError::OwnerMismatch { .. }
            | ListenerError::NotRunning,
        ) => StatusCode::CONFLICT,
        BridgeError::Listener(ListenerError::Connect(_) | ListenerError::Stream(_)) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn render_bridge_error(res: &mut Response, err: &BridgeError) {
    render_error(res, error_status(err), &err.to_string());
}

/// `owner_id` from the query string, rendering a 400 when absent.
pub(crate) fn owner_query(req: &mut Request, res: &mut Response) -> Option<i64> {
    match req.query::<i64>("owner_id") {
        Some(owner_id) => Some(owner_id),
        None => {
            render_error(res, StatusCode::BAD_REQUEST, "missing owner_id query parameter");
            None
        }
    }
}
