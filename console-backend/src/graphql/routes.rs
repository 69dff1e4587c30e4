//! GraphQL endpoints.
//!
//! - `POST /query` executes queries
//! - `GET /query` serves the playground
//! - `GET /query/ws` carries subscriptions over graphql-ws or graphql-transport-ws
//!
//! Queries and subscriptions both require an authenticated caller; the [`CurrentUser`] is handed
//! to resolvers as request data.

use std::time::Duration;

use async_graphql::{
    Data,
    http::{ALL_WEBSOCKET_PROTOCOLS, GraphQLPlaygroundConfig, WebSocket, WebSocketProtocols, WsMessage, playground_source},
};
use axum::{
    Json, Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{CloseFrame, Message},
    },
    http::{HeaderMap, header::SEC_WEBSOCKET_PROTOCOL},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use tracing::debug;

use crate::{AppState, auth::CurrentUser};

const KEEPALIVE: Duration = Duration::from_secs(30);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/query", get(playground).post(query))
        .route("/query/ws", get(subscriptions))
}

async fn query(State(state): State<AppState>, user: CurrentUser, Json(request): Json<async_graphql::Request>) -> Response {
    let response = state.schema.execute(request.data(user)).await;
    Json(response).into_response()
}

async fn playground() -> impl IntoResponse {
    Html(playground_source(
        GraphQLPlaygroundConfig::new("/query").subscription_endpoint("/query/ws"),
    ))
}

/// Prefer the sub-protocol the client asked for; graphql-transport-ws otherwise.
fn negotiate(headers: &HeaderMap) -> WebSocketProtocols {
    headers
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').find_map(|protocol| protocol.trim().parse().ok()))
        .unwrap_or(WebSocketProtocols::GraphQLWS)
}

async fn subscriptions(
    State(state): State<AppState>,
    user: CurrentUser,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let protocol = negotiate(&headers);

    ws.protocols(ALL_WEBSOCKET_PROTOCOLS).on_upgrade(move |socket| async move {
        let (mut sink, stream) = socket.split();
        let input = stream.filter_map(|message| async move {
            match message {
                Ok(Message::Text(text)) => Some(text.to_string()),
                _ => None,
            }
        });

        let mut data = Data::default();
        data.insert(user.clone());

        let mut messages = std::pin::pin!(
            WebSocket::new(state.schema.clone(), input, protocol)
                .connection_data(data)
                .keepalive_timeout(KEEPALIVE)
        );

        while let Some(message) = messages.next().await {
            let message = match message {
                WsMessage::Text(text) => Message::Text(text.into()),
                WsMessage::Close(code, reason) => Message::Close(Some(CloseFrame {
                    code,
                    reason: reason.into(),
                })),
            };
            if sink.send(message).await.is_err() {
                break;
            }
        }
        debug!(user = %user.email, "Subscription connection closed");
    })
}
