use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    middleware::auth::{decode_access_token, JwtSecret},
    services::{realtime, requests::RequestService},
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    pub token: String,
    pub request_id: Option<Uuid>,
}

/// GET /ws: account holders receive their notifications, supplier events and,
/// with `request_id`, the live updates of one of their requests.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> AppResult<Response> {
    let jwt = JwtSecret {
        secret: state.config.jwt_secret.clone(),
        audience: state.config.jwt_audience.clone(),
    };
    let user = decode_access_token(&params.token, &jwt).map_err(|e| {
        error!("WebSocket auth failed: {}", e);
        AppError::unauthenticated("Sesión inválida o expirada")
    })?;

    let mut channels = vec![
        realtime::user_channel(user.user_id),
        realtime::provider_channel(user.user_id),
    ];
    if let Some(request_id) = params.request_id {
        let request = RequestService::get(&state.db, request_id)
            .await?
            .filter(|r| r.is_owned_by(user.user_id) || r.supplier_id == Some(user.user_id))
            .ok_or_else(|| AppError::not_found("Solicitud no encontrada"))?;
        channels.push(realtime::request_channel(request.id));
    }

    info!("WebSocket connected: user={}", user.user_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, channels)))
}

/// GET /ws/track/{token}: live updates of a guest's request.
pub async fn ws_track_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Response> {
    let request = RequestService::get_by_token(&state.db, &token).await?;
    info!("WebSocket connected: guest tracking request {}", request.id);
    let channels = vec![realtime::request_channel(request.id)];
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, channels)))
}

async fn handle_socket(socket: WebSocket, state: AppState, channels: Vec<String>) {
    let (mut sender, mut receiver) = socket.split();

    // Dedicated pub/sub connection per socket
    let mut pubsub = match state.redis_client.get_async_pubsub().await {
        Ok(c) => c,
        Err(e) => {
            error!("Redis pubsub error: {}", e);
            return;
        }
    };

    for channel in &channels {
        if let Err(e) = pubsub.subscribe(channel).await {
            error!("Redis subscribe error on {}: {}", channel, e);
            return;
        }
    }

    // Redis Pub/Sub → WebSocket. Events are already `{"type", "payload"}` JSON.
    let mut redis_task = tokio::spawn(async move {
        let mut pubsub_stream = pubsub.on_message();
        while let Some(msg) = pubsub_stream.next().await {
            let payload: String = match msg.get_payload() {
                Ok(p) => p,
                Err(_) => continue,
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // The client only sends keep-alives; anything else is ignored.
    let mut client_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut redis_task) => client_task.abort(),
        _ = (&mut client_task) => redis_task.abort(),
    }

    info!("WebSocket disconnected ({} channel(s))", channels.len());
}
