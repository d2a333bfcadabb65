use crate::common::AppError;
use crate::config::AuthorizeConfig;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const TASK_SECRET_HEADER: &str = "x-task-secret";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    iss: String,
    sub: String,
    exp: i64,
    jti: String,
}

/// Signing material for user tokens plus the shared secret of the job endpoints.
pub struct AuthKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    task_secret: String,
}

impl AuthKeys {
    pub fn new(config: &AuthorizeConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            task_secret: config.task_secret.clone(),
        }
    }

    /// Signs a token naming `user` as subject, valid for `expire_secs` seconds.
    pub fn issue(&self, user: &str, expire_secs: i64) -> anyhow::Result<String> {
        let claims = Claims {
            iss: self.issuer.clone(),
            sub: user.to_string(),
            exp: chrono::Utc::now().timestamp() + expire_secs,
            jti: Uuid::new_v4().to_string(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn verify(&self, token: &str) -> Result<Claims, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|err| {
                tracing::debug!(reason = %err, "rejected bearer token");
                AppError::Unauthorized
            })
    }

    fn is_task_secret(&self, presented: &str) -> bool {
        !self.task_secret.is_empty() && presented == self.task_secret
    }
}

fn parse_claims(parts: &Parts, keys: &AuthKeys) -> Result<Claims, AppError> {
    let token = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|it| it.strip_prefix("Bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthorized)?;
    keys.verify(token)
}

/// Authenticated caller, taken from the `sub` claim of a bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub String);

impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
    Arc<AuthKeys>: FromRef<S>,
{
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<AuthKeys>::from_ref(state);
        let claims = parse_claims(parts, &keys)?;
        if claims.sub.is_empty() {
            return Err(AppError::Unauthorized);
        }
        Ok(Self(claims.sub))
    }
}

/// Caller presenting the task secret; only the queue substrate and cron hold it.
#[derive(Debug, Clone, Copy)]
pub struct TaskCaller;

impl<S> FromRequestParts<S> for TaskCaller
where
    S: Send + Sync,
    Arc<AuthKeys>: FromRef<S>,
{
    type Rejection = AppError;
    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = Arc::<AuthKeys>::from_ref(state);
        let presented = parts
            .headers
            .get(TASK_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if keys.is_task_secret(presented) {
            Ok(Self)
        } else {
            Err(AppError::Unauthorized)
        }
    }
}
