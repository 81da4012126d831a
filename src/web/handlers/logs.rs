use salvo::prelude::*;
use serde_json::json;

use crate::web::handlers::render_bridge_error;
use crate::web::web_state;

#[handler]
pub async fn list_logs(req: &mut Request, res: &mut Response) {
    let limit = req.query::<i64>("limit").unwrap_or(100).clamp(1, 500);
    let offset = req.query::<i64>("offset").unwrap_or(0).max(0);
    let owner_id = req.query::<i64>("owner_id");

    match web_state()
        .bridge
        .recent_logs(owner_id, limit, offset)
        .await
    {
        Ok(logs) => res.render(Json(json!({
            "logs": logs,
            "owner_id": owner_id,
            "count": logs.len(),
            "limit": limit,
            "offset": offset,
        }))),
        Err(err) => render_bridge_error(res, &err),
    }
}
