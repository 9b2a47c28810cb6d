//! WebSocket subscription route.

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use threadline_engine::ThreadRef;

use crate::auth::AuthUser;
use crate::handlers::handle_websocket_connection;
use crate::AppState;

/// Thread to subscribe to.
#[derive(Debug, Deserialize)]
pub struct SubscribeQuery {
    pub res_model: String,
    pub res_id: i64,
}

/// Create live routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws?res_model&res_id - Subscribe to a thread's notifications.
async fn ws_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(query): Query<SubscribeQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let channel = ThreadRef::new(query.res_model, query.res_id).channel();
    let conn_manager = state.conn_manager.clone();
    ws.on_upgrade(move |socket| handle_websocket_connection(socket, conn_manager, channel))
}
