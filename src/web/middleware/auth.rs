use salvo::prelude::*;
use secrecy::ExposeSecret;

use crate::web::handlers::render_error;
use crate::web::handlers::{
    health::{get_status, health_check},
    listener::{reload_listener, start_listener, stop_listener},
    logs::list_logs,
    routes::{create_route, delete_route, list_routes, toggle_route},
};
use crate::web::web_state;

/// Compares the `Authorization: Bearer <secret>` header with the configured
/// secret. Open when no secret is configured.
pub fn bearer_matches(header: Option<&str>, secret: Option<&str>) -> bool {
    let Some(secret) = secret else {
        return true;
    };
    header
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| token.trim() == secret)
}

#[handler]
pub async fn require_secret(req: &mut Request, res: &mut Response, ctrl: &mut FlowCtrl) {
    let secret = web_state()
        .shared_secret
        .as_ref()
        .map(|secret| secret.expose_secret().to_string());
    let header = req.header::<String>("authorization");

    if !bearer_matches(header.as_deref(), secret.as_deref()) {
        render_error(res, StatusCode::UNAUTHORIZED, "missing or invalid bearer token");
        ctrl.skip_rest();
    }
}

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health_check))
        .push(
            Router::new()
                .hoop(require_secret)
                .push(Router::with_path("status").get(get_status))
                .push(
                    Router::with_path("routes")
                        .get(list_routes)
                        .post(create_route),
                )
                .push(Router::with_path("routes/{id}").delete(delete_route))
                .push(Router::with_path("routes/{id}/toggle").post(toggle_route))
                .push(Router::with_path("listener/start").post(start_listener))
                .push(Router::with_path("listener/stop").post(stop_listener))
                .push(Router::with_path("listener/reload").post(reload_listener))
                .push(Router::with_path("logs").get(list_logs)),
        )
}
