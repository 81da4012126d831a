use salvo::prelude::*;
use serde_json::json;
use tracing::info;

use crate::web::handlers::{owner_query, render_bridge_error};
use crate::web::web_state;

#[handler]
pub async fn start_listener(req: &mut Request, res: &mut Response) {
    let Some(owner_id) = owner_query(req, res) else {
        return;
    };
    info!("listener start requested via API owner={owner_id}");

    match web_state().bridge.start_listener(owner_id).await {
        Ok(status) => res.render(Json(json!({ "ok": true, "listener": status }))),
        Err(err) => render_bridge_error(res, &err),
    }
}

#[handler]
pub async fn stop_listener(res: &mut Response) {
    match web_state().bridge.stop_listener().await {
        Ok(status) => res.render(Json(json!({ "ok": true, "listener": status }))),
        Err(err) => render_bridge_error(res, &err),
    }
}

#[handler]
pub async fn reload_listener(res: &mut Response) {
    match web_state().bridge.reload_listener().await {
        Ok(status) => res.render(Json(json!({ "ok": true, "listener": status }))),
        Err(err) => render_bridge_error(res, &err),
    }
}
