use salvo::prelude::*;
use serde_json::json;

use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    res.render(Json(json!({
        "status": "ok",
        "uptime_secs": web_state().started_at.elapsed().as_secs(),
    })));
}

#[handler]
pub async fn get_status(res: &mut Response) {
    let status = web_state().bridge.status();
    res.render(Json(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": web_state().started_at.elapsed().as_secs(),
        "listener": status,
    })));
}
