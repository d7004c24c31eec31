use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{
        auth::AuthenticatedUser,
        profile::{Profile, ProfileRole, VerificationStatus},
    },
    services::profiles::ProfileService,
    AppState,
};

/// Authenticated user holding a consumer profile.
pub struct ConsumerUser {
    pub user_id: Uuid,
    pub profile: Profile,
}

/// Authenticated user holding a supplier profile, whatever its verification state.
pub struct SupplierUser {
    pub user_id: Uuid,
    pub profile: Profile,
    pub verification: VerificationStatus,
}

impl SupplierUser {
    /// Fails unless the supplier is approved; suspended and banned suppliers
    /// keep read access only.
    pub fn require_approved(&self) -> Result<(), AppError> {
        if self.verification.can_operate() {
            Ok(())
        } else {
            Err(AppError::forbidden("Tu cuenta de aguatero no está aprobada"))
        }
    }
}

/// Authenticated user whose email is on the admin allowlist.
pub struct AdminUser {
    pub user_id: Uuid,
    pub email: String,
}

async fn load_profile(parts: &mut Parts, state: &AppState) -> Result<(Uuid, Profile), AppError> {
    let user = AuthenticatedUser::from_request_parts(parts, state).await?;
    let profile = ProfileService::get(&state.db, user.user_id)
        .await?
        .ok_or_else(|| AppError::forbidden("Completa tu perfil para continuar"))?;
    Ok((user.user_id, profile))
}

impl FromRequestParts<AppState> for ConsumerUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (user_id, profile) = load_profile(parts, state).await?;
        if profile.role() != Some(ProfileRole::Consumer) {
            return Err(AppError::forbidden("Acceso solo para clientes"));
        }
        Ok(ConsumerUser { user_id, profile })
    }
}

impl FromRequestParts<AppState> for SupplierUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (user_id, profile) = load_profile(parts, state).await?;
        if profile.role() != Some(ProfileRole::Supplier) {
            return Err(AppError::forbidden("Acceso solo para aguateros"));
        }
        let verification = profile.verification().unwrap_or(VerificationStatus::Pending);
        if verification == VerificationStatus::Banned {
            return Err(AppError::forbidden("Tu cuenta fue bloqueada"));
        }
        Ok(SupplierUser {
            user_id,
            profile,
            verification,
        })
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        let email = user
            .email
            .ok_or_else(|| AppError::forbidden("Acceso restringido a administradores"))?;

        if !ProfileService::is_admin_email(&state.db, &email).await? {
            tracing::warn!("Admin access denied for {}", email);
            return Err(AppError::forbidden("Acceso restringido a administradores"));
        }

        Ok(AdminUser {
            user_id: user.user_id,
            email,
        })
    }
}
