use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};

use crate::error::AppError;
use crate::models::auth::{AuthenticatedUser, Claims};

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::unauthenticated("Debes iniciar sesión"))?;

        authenticate(parts, auth_header)
    }
}

/// Guest-friendly extraction: no `Authorization` header yields `None`, but a
/// header carrying a bad token is still rejected.
impl<S> OptionalFromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        let Some(auth_header) = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(None);
        };

        authenticate(parts, auth_header).map(Some)
    }
}

fn authenticate(parts: &Parts, auth_header: &str) -> Result<AuthenticatedUser, AppError> {
    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthenticated("Formato de autorización inválido"))?;

    let jwt = parts
        .extensions
        .get::<JwtSecret>()
        .ok_or_else(|| AppError::Other(anyhow::anyhow!("JWT secret not configured")))?;

    decode_access_token(token, jwt)
        .map_err(|_| AppError::unauthenticated("Sesión inválida o expirada"))
}

/// Extension type to carry the JWT verification settings through request extensions.
#[derive(Clone)]
pub struct JwtSecret {
    pub secret: String,
    pub audience: String,
}

pub fn decode_access_token(token: &str, jwt: &JwtSecret) -> Result<AuthenticatedUser, anyhow::Error> {
    let key = DecodingKey::from_secret(jwt.secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[jwt.audience.as_str()]);

    let data = decode::<Claims>(token, &key, &validation)?;
    let claims = data.claims;

    Ok(AuthenticatedUser {
        user_id: claims.sub.parse()?,
        email: claims.email.map(|e| e.to_lowercase()),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use axum::http::Request;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    pub(crate) fn jwt() -> JwtSecret {
        JwtSecret {
            secret: "test-secret".into(),
            audience: "authenticated".into(),
        }
    }

    pub(crate) fn token_for(user_id: Uuid, email: &str, aud: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: user_id.to_string(),
            email: Some(email.to_string()),
            phone: None,
            role: Some("authenticated".into()),
            aud: aud.to_string(),
            exp: (Utc::now().timestamp() + exp_offset) as usize,
            iat: Utc::now().timestamp() as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(jwt().secret.as_bytes()),
        )
        .unwrap()
    }

    fn parts_with(auth: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/requests");
        if let Some(a) = auth {
            builder = builder.header("Authorization", a);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        parts.extensions.insert(jwt());
        parts
    }

    #[test]
    fn decodes_valid_token_and_lowercases_email() {
        let id = Uuid::new_v4();
        let token = token_for(id, "Ana@Example.CL", "authenticated", 3600);
        let user = decode_access_token(&token, &jwt()).unwrap();
        assert_eq!(user.user_id, id);
        assert_eq!(user.email.as_deref(), Some("ana@example.cl"));
    }

    #[test]
    fn rejects_expired_token() {
        let token = token_for(Uuid::new_v4(), "a@b.cl", "authenticated", -3600);
        assert!(decode_access_token(&token, &jwt()).is_err());
    }

    #[test]
    fn rejects_wrong_audience() {
        let token = token_for(Uuid::new_v4(), "a@b.cl", "anon", 3600);
        assert!(decode_access_token(&token, &jwt()).is_err());
    }

    #[tokio::test]
    async fn missing_header_is_unauthenticated() {
        let mut parts = parts_with(None);
        let err = <AuthenticatedUser as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn optional_extraction_allows_guests() {
        let mut parts = parts_with(None);
        let user =
            <AuthenticatedUser as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &())
                .await
                .unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn optional_extraction_still_rejects_bad_tokens() {
        let mut parts = parts_with(Some("Bearer not-a-jwt"));
        let res =
            <AuthenticatedUser as OptionalFromRequestParts<()>>::from_request_parts(&mut parts, &())
                .await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn bearer_token_is_accepted() {
        let id = Uuid::new_v4();
        let header = format!("Bearer {}", token_for(id, "a@b.cl", "authenticated", 600));
        let mut parts = parts_with(Some(&header));
        let user = <AuthenticatedUser as FromRequestParts<()>>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(user.user_id, id);
    }
}
