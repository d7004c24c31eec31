use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        rating::{Rating, SubmitRatingRequest},
        request::RequestStatus,
    },
    services::requests::RequestService,
};

pub struct RatingService;

impl RatingService {
    /// Rates the supplier of a delivered request. Rating again replaces the
    /// previous score.
    pub async fn submit(
        pool: &PgPool,
        consumer_id: Uuid,
        request_id: Uuid,
        req: &SubmitRatingRequest,
    ) -> AppResult<Rating> {
        req.validate().map_err(AppError::bad_request)?;

        let request = RequestService::get(pool, request_id)
            .await?
            .filter(|r| r.is_owned_by(consumer_id))
            .ok_or_else(|| AppError::not_found("Solicitud no encontrada"))?;
        if request.status()? != RequestStatus::Delivered {
            return Err(AppError::bad_request("Solo puedes calificar pedidos entregados"));
        }
        let provider_id = request
            .supplier_id
            .ok_or_else(|| AppError::bad_request("El pedido no tiene aguatero asignado"))?;

        let rating = sqlx::query_as::<_, Rating>(
            "INSERT INTO ratings (request_id, consumer_id, provider_id, rating, comment)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (request_id, consumer_id) DO UPDATE
             SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, updated_at = NOW()
             RETURNING *",
        )
        .bind(request_id)
        .bind(consumer_id)
        .bind(provider_id)
        .bind(req.rating)
        .bind(req.normalized_comment())
        .fetch_one(pool)
        .await?;

        tracing::info!("Request {} rated {} by {}", request_id, rating.rating, consumer_id);
        Ok(rating)
    }

    pub async fn for_request(pool: &PgPool, consumer_id: Uuid, request_id: Uuid) -> AppResult<Option<Rating>> {
        let rating = sqlx::query_as::<_, Rating>(
            "SELECT * FROM ratings WHERE request_id = $1 AND consumer_id = $2",
        )
        .bind(request_id)
        .bind(consumer_id)
        .fetch_optional(pool)
        .await?;
        Ok(rating)
    }
}
