use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        comuna,
        profile::{Profile, ProfileRole, RatingSummary, UpsertConsumerProfileRequest},
    },
};

pub struct ProfileService;

impl ProfileService {
    pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<Option<Profile>> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(profile)
    }

    /// Creates or updates the caller's consumer profile. A supplier account
    /// cannot turn itself into a consumer.
    pub async fn upsert_consumer(
        pool: &PgPool,
        user_id: Uuid,
        email: Option<&str>,
        req: &UpsertConsumerProfileRequest,
    ) -> AppResult<Profile> {
        if req.full_name.trim().is_empty() || req.phone.trim().is_empty() {
            return Err(AppError::bad_request("Nombre y teléfono son obligatorios"));
        }
        if let Some(c) = &req.comuna_id {
            if !comuna::is_known(c) {
                return Err(AppError::bad_request("Comuna no disponible"));
            }
        }
        if let Some(existing) = Self::get(pool, user_id).await? {
            if existing.role() != Some(ProfileRole::Consumer) {
                return Err(AppError::conflict("Esta cuenta está registrada como aguatero"));
            }
        }

        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles (id, role, full_name, phone, email, address, comuna_id, special_instructions)
             VALUES ($1, 'consumer', $2, $3, $4, $5, $6, $7)
             ON CONFLICT (id) DO UPDATE
             SET full_name = EXCLUDED.full_name,
                 phone = EXCLUDED.phone,
                 email = COALESCE(EXCLUDED.email, profiles.email),
                 address = EXCLUDED.address,
                 comuna_id = EXCLUDED.comuna_id,
                 special_instructions = EXCLUDED.special_instructions,
                 updated_at = NOW()
             RETURNING *",
        )
        .bind(user_id)
        .bind(req.full_name.trim())
        .bind(req.phone.trim())
        .bind(email)
        .bind(&req.address)
        .bind(&req.comuna_id)
        .bind(&req.special_instructions)
        .fetch_one(pool)
        .await?;
        Ok(profile)
    }

    pub async fn is_admin_email(pool: &PgPool, email: &str) -> AppResult<bool> {
        let allowed: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM admin_allowed_emails WHERE email = LOWER($1))",
        )
        .bind(email)
        .fetch_one(pool)
        .await?;
        Ok(allowed)
    }

    pub async fn rating_summary(pool: &PgPool, provider_id: Uuid) -> AppResult<RatingSummary> {
        let summary = sqlx::query_as::<_, RatingSummary>(
            "SELECT AVG(rating)::DOUBLE PRECISION AS average, COUNT(*)::BIGINT AS count
             FROM ratings WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_one(pool)
        .await?;
        Ok(summary)
    }

    pub async fn service_areas(pool: &PgPool, provider_id: Uuid) -> AppResult<Vec<String>> {
        let areas: Vec<String> = sqlx::query_scalar(
            "SELECT comuna_id FROM provider_service_areas WHERE provider_id = $1 ORDER BY comuna_id",
        )
        .bind(provider_id)
        .fetch_all(pool)
        .await?;
        Ok(areas)
    }
}
