use salvo::prelude::*;
use serde::Deserialize;
use serde_json::json;

use crate::parsers::MessageUtils;
use crate::web::handlers::{owner_query, render_bridge_error, render_error};
use crate::web::web_state;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum DestinationList {
    List(Vec<String>),
    Joined(String),
}

impl DestinationList {
    pub fn into_handles(self) -> Vec<String> {
        match self {
            DestinationList::List(items) => items,
            DestinationList::Joined(value) => MessageUtils::split_handle_list(&value),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateRouteRequest {
    pub owner_id: i64,
    pub source: String,
    pub destinations: DestinationList,
}

fn route_id(req: &mut Request, res: &mut Response) -> Option<i64> {
    match req.param::<i64>("id") {
        Some(id) if id > 0 => Some(id),
        _ => {
            render_error(res, StatusCode::BAD_REQUEST, "invalid route id");
            None
        }
    }
}

#[handler]
pub async fn list_routes(req: &mut Request, res: &mut Response) {
    let Some(owner_id) = owner_query(req, res) else {
        return;
    };

    match web_state().bridge.list_routes(owner_id).await {
        Ok(routes) => res.render(Json(json!({
            "routes": routes,
            "count": routes.len(),
        }))),
        Err(err) => render_bridge_error(res, &err),
    }
}

#[handler]
pub async fn create_route(req: &mut Request, res: &mut Response) {
    let body = match req.parse_json::<CreateRouteRequest>().await {
        Ok(body) => body,
        Err(err) => {
            render_error(res, StatusCode::BAD_REQUEST, &format!("invalid body: {err}"));
            return;
        }
    };
    let destinations = body.destinations.into_handles();

    match web_state()
        .bridge
        .add_route(body.owner_id, &body.source, &destinations)
        .await
    {
        Ok(route) => {
            res.status_code(StatusCode::CREATED);
            res.render(Json(json!({ "ok": true, "route": route })));
        }
        Err(err) => render_bridge_error(res, &err),
    }
}

#[handler]
pub async fn delete_route(req: &mut Request, res: &mut Response) {
    let Some(owner_id) = owner_query(req, res) else {
        return;
    };
    let Some(id) = route_id(req, res) else {
        return;
    };

    match web_state().bridge.remove_route(owner_id, id).await {
        Ok(route) => res.render(Json(json!({ "ok": true, "route": route }))),
        Err(err) => render_bridge_error(res, &err),
    }
}

#[handler]
pub async fn toggle_route(req: &mut Request, res: &mut Response) {
    let Some(owner_id) = owner_query(req, res) else {
        return;
    };
    let Some(id) = route_id(req, res) else {
        return;
    };

    match web_state().bridge.toggle_route(owner_id, id).await {
        Ok(route) => res.render(Json(json!({ "ok": true, "route": route }))),
        Err(err) => render_bridge_error(res, &err),
    }
}

#[cfg(test)]
mod tests {
    use super::CreateRouteRequest;

    #[test]
    fn destinations_accept_list_or_joined_string() {
        let listed: CreateRouteRequest = serde_json::from_str(
            r#"{"owner_id": 1, "source": "@a", "destinations": ["@b", "@c"]}"#,
        )
        .expect("list form");
        assert_eq!(listed.destinations.into_handles(), vec!["@b", "@c"]);

        let joined: CreateRouteRequest = serde_json::from_str(
            r#"{"owner_id": 1, "source": "@a", "destinations": "@b, @c"}"#,
        )
        .expect("joined form");
        assert_eq!(joined.destinations.into_handles(), vec!["@b", "@c"]);
    }
}
