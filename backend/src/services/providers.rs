use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        comuna,
        profile::{
            BankInfo, Profile, ProfileRole, SupplierOnboardingRequest, UpdateSupplierProfileRequest,
            VerificationStatus,
        },
    },
    services::profiles::ProfileService,
};

pub struct ProviderService;

/// Comuna ids must be known and listed at least once.
fn validate_areas(comuna_ids: &[String]) -> Result<(), &'static str> {
    if comuna_ids.is_empty() {
        return Err("Selecciona al menos una comuna");
    }
    if comuna_ids.iter().any(|c| !comuna::is_known(c)) {
        return Err("Comuna no disponible");
    }
    Ok(())
}

fn validate_vehicle(vehicle_type: &str, capacity: i32) -> Result<(), &'static str> {
    if vehicle_type.trim().is_empty() {
        return Err("Indica el tipo de vehículo");
    }
    if capacity <= 0 {
        return Err("La capacidad del vehículo debe ser positiva");
    }
    Ok(())
}

impl ProviderService {
    /// Registers the caller as a supplier awaiting verification.
    pub async fn onboard(
        pool: &PgPool,
        user_id: Uuid,
        email: Option<&str>,
        req: &SupplierOnboardingRequest,
    ) -> AppResult<Profile> {
        if req.full_name.trim().is_empty() || req.phone.trim().is_empty() {
            return Err(AppError::bad_request("Nombre y teléfono son obligatorios"));
        }
        validate_vehicle(&req.vehicle_type, req.vehicle_capacity).map_err(AppError::bad_request)?;
        req.pricing.validate().map_err(AppError::bad_request)?;
        validate_areas(&req.service_areas).map_err(AppError::bad_request)?;
        if let Some(bank) = &req.bank {
            bank.validate().map_err(AppError::bad_request)?;
        }

        if let Some(existing) = ProfileService::get(pool, user_id).await? {
            return Err(match existing.role() {
                Some(ProfileRole::Supplier) => AppError::conflict("Ya estás registrado como aguatero"),
                _ => AppError::conflict("Esta cuenta está registrada como cliente"),
            });
        }

        let mut tx = pool.begin().await?;
        let profile = sqlx::query_as::<_, Profile>(
            "INSERT INTO profiles
             (id, role, full_name, phone, email, verification_status, vehicle_type, vehicle_capacity,
              price_100l, price_1000l, price_5000l, price_10000l,
              bank_name, bank_account_type, bank_account_number, bank_rut)
             VALUES ($1, 'supplier', $2, $3, $4, 'pending', $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
             RETURNING *",
        )
        .bind(user_id)
        .bind(req.full_name.trim())
        .bind(req.phone.trim())
        .bind(email)
        .bind(req.vehicle_type.trim())
        .bind(req.vehicle_capacity)
        .bind(req.pricing.price_100l)
        .bind(req.pricing.price_1000l)
        .bind(req.pricing.price_5000l)
        .bind(req.pricing.price_10000l)
        .bind(req.bank.as_ref().map(|b| b.bank_name.trim().to_string()))
        .bind(req.bank.as_ref().map(|b| b.account_type.clone()))
        .bind(req.bank.as_ref().map(|b| b.account_number.trim().to_string()))
        .bind(req.bank.as_ref().map(|b| b.rut.clone()))
        .fetch_one(&mut *tx)
        .await?;

        replace_areas(&mut tx, user_id, &req.service_areas).await?;
        tx.commit().await?;

        tracing::info!("Supplier {} onboarded, awaiting verification", user_id);
        Ok(profile)
    }

    pub async fn update_profile(
        pool: &PgPool,
        profile: &Profile,
        req: &UpdateSupplierProfileRequest,
    ) -> AppResult<Profile> {
        let vehicle_type = req.vehicle_type.as_deref().or(profile.vehicle_type.as_deref()).unwrap_or("");
        let capacity = req.vehicle_capacity.or(profile.vehicle_capacity).unwrap_or(0);
        validate_vehicle(vehicle_type, capacity).map_err(AppError::bad_request)?;
        if let Some(pricing) = &req.pricing {
            pricing.validate().map_err(AppError::bad_request)?;
        }
        if req.full_name.as_deref().is_some_and(|n| n.trim().is_empty())
            || req.phone.as_deref().is_some_and(|p| p.trim().is_empty())
        {
            return Err(AppError::bad_request("Nombre y teléfono son obligatorios"));
        }

        let updated = sqlx::query_as::<_, Profile>(
            "UPDATE profiles
             SET full_name = COALESCE($2, full_name),
                 phone = COALESCE($3, phone),
                 vehicle_type = $4,
                 vehicle_capacity = $5,
                 price_100l = COALESCE($6, price_100l),
                 price_1000l = COALESCE($7, price_1000l),
                 price_5000l = COALESCE($8, price_5000l),
                 price_10000l = COALESCE($9, price_10000l),
                 updated_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(profile.id)
        .bind(req.full_name.as_deref().map(str::trim))
        .bind(req.phone.as_deref().map(str::trim))
        .bind(vehicle_type.trim())
        .bind(capacity)
        .bind(req.pricing.map(|p| p.price_100l))
        .bind(req.pricing.map(|p| p.price_1000l))
        .bind(req.pricing.map(|p| p.price_5000l))
        .bind(req.pricing.map(|p| p.price_10000l))
        .fetch_one(pool)
        .await?;
        Ok(updated)
    }

    pub async fn set_service_areas(pool: &PgPool, provider_id: Uuid, comuna_ids: &[String]) -> AppResult<Vec<String>> {
        validate_areas(comuna_ids).map_err(AppError::bad_request)?;
        let mut tx = pool.begin().await?;
        replace_areas(&mut tx, provider_id, comuna_ids).await?;
        tx.commit().await?;
        ProfileService::service_areas(pool, provider_id).await
    }

    pub async fn set_bank(pool: &PgPool, provider_id: Uuid, bank: &BankInfo) -> AppResult<()> {
        bank.validate().map_err(AppError::bad_request)?;
        sqlx::query(
            "UPDATE profiles
             SET bank_name = $2, bank_account_type = $3, bank_account_number = $4, bank_rut = $5,
                 updated_at = NOW()
             WHERE id = $1",
        )
        .bind(provider_id)
        .bind(bank.bank_name.trim())
        .bind(&bank.account_type)
        .bind(bank.account_number.trim())
        .bind(&bank.rut)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Only approved suppliers can go online; going offline is always allowed.
    pub async fn set_availability(
        pool: &PgPool,
        provider_id: Uuid,
        verification: VerificationStatus,
        is_available: bool,
    ) -> AppResult<bool> {
        if is_available && !verification.can_operate() {
            return Err(AppError::forbidden("Tu cuenta aún no está aprobada"));
        }
        sqlx::query("UPDATE profiles SET is_available = $2, updated_at = NOW() WHERE id = $1")
            .bind(provider_id)
            .bind(is_available)
            .execute(pool)
            .await?;
        tracing::info!("Supplier {} availability set to {}", provider_id, is_available);
        Ok(is_available)
    }
}

async fn replace_areas(
    tx: &mut Transaction<'_, Postgres>,
    provider_id: Uuid,
    comuna_ids: &[String],
) -> AppResult<()> {
    sqlx::query("DELETE FROM provider_service_areas WHERE provider_id = $1")
        .bind(provider_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query(
        "INSERT INTO provider_service_areas (provider_id, comuna_id)
         SELECT $1, UNNEST($2::text[])
         ON CONFLICT DO NOTHING",
    )
    .bind(provider_id)
    .bind(comuna_ids)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn areas_must_be_known_and_non_empty() {
        assert!(validate_areas(&[]).is_err());
        assert!(validate_areas(&["pucon".to_string()]).is_ok());
        assert_eq!(
            validate_areas(&["pucon".to_string(), "santiago".to_string()]),
            Err("Comuna no disponible")
        );
    }

    #[test]
    fn vehicle_needs_type_and_capacity() {
        assert!(validate_vehicle("Camión aljibe", 10_000).is_ok());
        assert!(validate_vehicle(" ", 10_000).is_err());
        assert!(validate_vehicle("Camioneta", 0).is_err());
    }
}
