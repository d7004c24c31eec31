use redis::AsyncCommands;
use uuid::Uuid;

use crate::models::notification::RealtimeEvent;

pub fn request_channel(request_id: Uuid) -> String {
    format!("request:{request_id}")
}

pub fn provider_channel(provider_id: Uuid) -> String {
    format!("provider:{provider_id}")
}

pub fn user_channel(user_id: Uuid) -> String {
    format!("user:{user_id}")
}

/// Publishes an event on a Redis channel. Failures are logged: realtime
/// delivery is best effort and clients fall back to polling.
pub async fn publish(
    redis: &mut redis::aio::MultiplexedConnection,
    channel: &str,
    event: &RealtimeEvent,
) {
    let payload = match serde_json::to_string(event) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!("Realtime: failed to serialize {} event: {}", event.kind, e);
            return;
        }
    };
    if let Err(e) = redis.publish::<_, _, ()>(channel, &payload).await {
        tracing::warn!("Realtime: publish to {} failed: {}", channel, e);
    }
}
