use sqlx::PgPool;

use crate::{
    error::{AppError, AppResult},
    models::settings::{PlatformSettings, UpdateSettingsRequest},
};

pub struct SettingsService;

impl SettingsService {
    pub async fn load(pool: &PgPool) -> AppResult<PlatformSettings> {
        let rows: Vec<(String, serde_json::Value)> =
            sqlx::query_as("SELECT key, value FROM admin_settings")
                .fetch_all(pool)
                .await?;
        Ok(PlatformSettings::from_rows(&rows))
    }

    /// Applies a partial update; the merged settings must validate as a whole.
    pub async fn update(
        pool: &PgPool,
        req: &UpdateSettingsRequest,
        updated_by: &str,
    ) -> AppResult<PlatformSettings> {
        let current = Self::load(pool).await?;
        let next = req.apply_to(&current);
        next.validate().map_err(AppError::bad_request)?;

        let mut tx = pool.begin().await?;
        for (key, value) in next.to_rows() {
            sqlx::query(
                "INSERT INTO admin_settings (key, value, updated_by, updated_at)
                 VALUES ($1, $2, $3, NOW())
                 ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, updated_by = EXCLUDED.updated_by, updated_at = NOW()",
            )
            .bind(key)
            .bind(&value)
            .bind(updated_by)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        tracing::info!("Platform settings updated by {}", updated_by);
        Ok(next)
    }
}
