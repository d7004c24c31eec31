use reqwest::Client;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        notification::{
            NewNotification, Notification, NotificationListQuery, PushSubscription, RealtimeEvent,
        },
        page_bounds,
    },
    services::{
        metrics,
        push::{push_client, PushOutcome, VapidSigner},
        realtime,
    },
};

pub struct NotificationService {
    pub client: Client,
    redis: redis::aio::MultiplexedConnection,
    vapid: Option<VapidSigner>,
}

impl NotificationService {
    pub fn new(
        redis: redis::aio::MultiplexedConnection,
        vapid: Option<VapidSigner>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: push_client()?,
            redis,
            vapid,
        })
    }

    /// Stores an in-app notification, then pushes it to the user's devices and
    /// realtime channel. Never fails: the caller's transition has already
    /// happened and must not be undone by a notification problem.
    pub async fn notify(&self, pool: &PgPool, user_id: Uuid, notification: NewNotification) {
        let stored = sqlx::query_as::<_, Notification>(
            "INSERT INTO notifications (user_id, type, title, message, data)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.data)
        .fetch_one(pool)
        .await;

        let stored = match stored {
            Ok(n) => {
                metrics::record_notification("in_app", true);
                n
            }
            Err(e) => {
                metrics::record_notification("in_app", false);
                tracing::warn!(
                    "Notification {} for user {} not stored: {}",
                    notification.kind,
                    user_id,
                    e
                );
                return;
            }
        };

        let event = RealtimeEvent::new(
            "notification",
            serde_json::to_value(&stored).unwrap_or_default(),
        );
        let mut redis = self.redis.clone();
        realtime::publish(&mut redis, &realtime::user_channel(user_id), &event).await;

        if let Err(e) = self.push_to_user(pool, user_id).await {
            tracing::warn!("Push to user {} failed: {}", user_id, e);
        }
    }

    pub async fn notify_many(&self, pool: &PgPool, user_ids: &[Uuid], notification: NewNotification) {
        for user_id in user_ids {
            self.notify(pool, *user_id, notification.clone()).await;
        }
    }

    async fn push_to_user(&self, pool: &PgPool, user_id: Uuid) -> anyhow::Result<()> {
        let Some(vapid) = &self.vapid else {
            tracing::debug!("VAPID not configured, skipping push notification");
            return Ok(());
        };

        let subscriptions = sqlx::query_as::<_, PushSubscription>(
            "SELECT id, user_id, endpoint, p256dh, auth FROM push_subscriptions WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        for sub in subscriptions {
            match vapid.send(&self.client, &sub.endpoint).await {
                Ok(PushOutcome::Delivered) => metrics::record_notification("push", true),
                Ok(PushOutcome::Gone) => {
                    tracing::info!("Removing expired push subscription {}", sub.id);
                    sqlx::query("DELETE FROM push_subscriptions WHERE id = $1")
                        .bind(sub.id)
                        .execute(pool)
                        .await?;
                }
                Ok(PushOutcome::Failed(status)) => {
                    metrics::record_notification("push", false);
                    tracing::warn!("Push service answered {} for subscription {}", status, sub.id);
                }
                Err(e) => {
                    metrics::record_notification("push", false);
                    tracing::warn!("Push to subscription {} failed: {}", sub.id, e);
                }
            }
        }
        Ok(())
    }

    pub async fn list(
        pool: &PgPool,
        user_id: Uuid,
        query: &NotificationListQuery,
    ) -> AppResult<Vec<Notification>> {
        let (per_page, offset) = page_bounds(query.page, query.per_page, 20, 100);
        let rows = sqlx::query_as::<_, Notification>(
            "SELECT * FROM notifications
             WHERE user_id = $1 AND (NOT $2 OR read = FALSE)
             ORDER BY created_at DESC
             LIMIT $3 OFFSET $4",
        )
        .bind(user_id)
        .bind(query.unread_only)
        .bind(per_page)
        .bind(offset)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    pub async fn unread_count(pool: &PgPool, user_id: Uuid) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)::BIGINT FROM notifications WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(count)
    }

    /// Returns false when the notification does not belong to the user.
    pub async fn mark_read(pool: &PgPool, user_id: Uuid, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE id = $1 AND user_id = $2",
        )
        .bind(id)
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn mark_all_read(pool: &PgPool, user_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE notifications SET read = TRUE WHERE user_id = $1 AND read = FALSE",
        )
        .bind(user_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Re-registering an endpoint moves it to the current user.
    pub async fn register_push_subscription(
        pool: &PgPool,
        user_id: Uuid,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO push_subscriptions (user_id, endpoint, p256dh, auth)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (endpoint) DO UPDATE
             SET user_id = EXCLUDED.user_id, p256dh = EXCLUDED.p256dh, auth = EXCLUDED.auth",
        )
        .bind(user_id)
        .bind(endpoint)
        .bind(p256dh)
        .bind(auth)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn unregister_push_subscription(
        pool: &PgPool,
        user_id: Uuid,
        endpoint: &str,
    ) -> AppResult<()> {
        sqlx::query("DELETE FROM push_subscriptions WHERE user_id = $1 AND endpoint = $2")
            .bind(user_id)
            .bind(endpoint)
            .execute(pool)
            .await?;
        Ok(())
    }
}
