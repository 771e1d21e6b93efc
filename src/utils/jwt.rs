// src/utils/jwt.rs

use std::{
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::{config::Config, error::AppError};

/// JWT Claims structure. Tokens are issued by the auth service; this crate
/// only verifies them.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Claims {
    /// Subject - the caller's opaque identity.
    pub sub: String,
    /// Caller's role: 'student', 'teacher' or 'admin'.
    pub role: String,
    /// Expiration time as Unix timestamp.
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Role::Student),
            "teacher" => Ok(Role::Teacher),
            "admin" => Ok(Role::Admin),
            _ => Err(AppError::AuthError("Unknown role".to_string())),
        }
    }
}

impl Role {
    pub fn can_manage_sessions(&self) -> bool {
        matches!(self, Role::Teacher | Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The authenticated caller as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: String,
    pub role: Role,
}

impl Caller {
    pub fn new(identity: impl Into<String>, role: Role) -> Self {
        Self {
            identity: identity.into(),
            role,
        }
    }
}

impl TryFrom<&Claims> for Caller {
    type Error = AppError;

    fn try_from(claims: &Claims) -> Result<Self, Self::Error> {
        if claims.sub.is_empty() {
            return Err(AppError::AuthError("Token has no subject".to_string()));
        }
        Ok(Caller {
            identity: claims.sub.clone(),
            role: claims.role.parse()?,
        })
    }
}

/// Extracts the `Caller` from the claims injected by `auth_middleware`.
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts
            .extensions
            .get::<Claims>()
            .ok_or_else(|| AppError::AuthError("Missing credentials".to_string()))?;
        Caller::try_from(claims)
    }
}

/// Signs a JWT for `identity`. Used by tooling and tests; production tokens
/// come from the auth service sharing the same secret.
pub fn sign_jwt(
    identity: &str,
    role: &str,
    secret: &str,
    expiration_seconds: u64,
) -> Result<String, AppError> {
    let expiration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::InternalServerError(e.to_string()))?
        .as_secs() as usize
        + expiration_seconds as usize;

    let claims = Claims {
        sub: identity.to_owned(),
        role: role.to_owned(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::InternalServerError(e.to_string()))
}

/// Verifies and decodes a JWT string.
pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims, AppError> {
    let token_data = decode(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::AuthError("Invalid token".to_string()))?;

    Ok(token_data.claims)
}

/// Axum Middleware: Authentication.
///
/// Validates the 'Authorization: Bearer <token>' header and injects `Claims`
/// into the request extensions. Returns 401 otherwise.
pub async fn auth_middleware(
    State(config): State<Config>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) => token,
        None => return Err(StatusCode::UNAUTHORIZED),
    };

    match verify_jwt(token, &config.jwt_secret) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            Ok(next.run(req).await)
        }
        Err(_) => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Axum Middleware: session-management rights.
///
/// Must be used AFTER `auth_middleware`. Lets teachers and admins through,
/// returns 403 for everyone else.
pub async fn manager_middleware(req: Request<Body>, next: Next) -> Result<Response, StatusCode> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let role: Role = claims.role.parse().map_err(|_| StatusCode::FORBIDDEN)?;
    if !role.can_manage_sessions() {
        return Err(StatusCode::FORBIDDEN);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_then_verify() {
        let token = sign_jwt("student-42", "student", "secret", 60).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "student-42");
        assert_eq!(claims.role, "student");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_jwt("student-42", "student", "secret", 60).unwrap();
        assert!(verify_jwt(&token, "other").is_err());
    }

    #[test]
    fn test_caller_from_claims() {
        let claims = Claims {
            sub: "t-1".into(),
            role: "teacher".into(),
            exp: 0,
        };
        let caller = Caller::try_from(&claims).unwrap();
        assert_eq!(caller, Caller::new("t-1", Role::Teacher));
        assert!(caller.role.can_manage_sessions());
        assert!(!caller.role.is_admin());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let claims = Claims {
            sub: "x".into(),
            role: "root".into(),
            exp: 0,
        };
        assert!(Caller::try_from(&claims).is_err());
    }
}
