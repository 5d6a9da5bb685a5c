use std::sync::Arc;

use axum::extract::{FromRequest, RequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::{async_trait, Extension};
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::AdminAccount;
use crate::err::JsonBody;
use crate::models::Identity;
use crate::state::AppState;
use crate::{proceeds, Error, Payload};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingFields,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Access denied. No token provided.")]
    MissingToken,
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// What a session token asserts about its bearer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub name: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn identity(&self) -> Identity {
        Identity {
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Issues and checks `hex(claims).hex(hmac_sha256(claims))` tokens.
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(key: Vec<u8>, ttl: Duration) -> Self {
        Self { key, ttl }
    }

    fn mac(&self) -> Result<HmacSha256, AuthError> {
        HmacSha256::new_from_slice(&self.key).map_err(|err| AuthError::Signing(err.to_string()))
    }

    pub fn issue(&self, identity: &Identity) -> Result<(String, Claims), AuthError> {
        self.issue_at(identity, Utc::now())
    }

    pub fn issue_at(
        &self,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<(String, Claims), AuthError> {
        let claims = Claims {
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        let payload =
            serde_json::to_vec(&claims).map_err(|err| AuthError::Signing(err.to_string()))?;
        let mut mac = self.mac()?;
        mac.update(&payload);
        let signature = mac.finalize().into_bytes();
        let token = format!("{}.{}", hex::encode(&payload), hex::encode(signature));
        Ok((token, claims))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, Utc::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthError> {
        let (payload, signature) = token
            .trim()
            .split_once('.')
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        let payload = hex::decode(payload).map_err(|_| AuthError::InvalidOrExpiredToken)?;
        let signature = hex::decode(signature).map_err(|_| AuthError::InvalidOrExpiredToken)?;

        let mut mac = self.mac()?;
        mac.update(&payload);
        if mac.verify_slice(&signature).is_err() {
            log::warn!("Rejected token with a bad signature");
            return Err(AuthError::InvalidOrExpiredToken);
        }

        let claims: Claims =
            serde_json::from_slice(&payload).map_err(|_| AuthError::InvalidOrExpiredToken)?;
        if now.timestamp() >= claims.exp {
            log::info!("Rejected expired token for {}", claims.email);
            return Err(AuthError::InvalidOrExpiredToken);
        }
        Ok(claims)
    }
}

/// The single admin account. The password is only kept as a PBKDF2 hash.
pub struct CredentialVerifier {
    identity: Identity,
    password_hash: String,
    signer: TokenSigner,
}

impl CredentialVerifier {
    pub fn new(account: &AdminAccount, signer: TokenSigner) -> Result<Self, AuthError> {
        let password_hash = Pbkdf2
            .hash_password(
                account.password.as_bytes(),
                &SaltString::generate(&mut OsRng),
            )
            .map_err(|err| AuthError::Hashing(err.to_string()))?
            .to_string();
        Ok(Self {
            identity: account.identity.clone(),
            password_hash,
            signer,
        })
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn password_matches(&self, password: &str) -> Result<bool, AuthError> {
        let hash = PasswordHash::new(&self.password_hash)
            .map_err(|err| AuthError::Hashing(err.to_string()))?;
        Ok(Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok())
    }

    pub fn login(&self, email: &str, password: &str) -> Result<(String, Claims), AuthError> {
        if email.is_empty() || password.is_empty() {
            return Err(AuthError::MissingFields);
        }
        if email != self.identity.email || !self.password_matches(password)? {
            log::warn!("Failed login attempt for {}", email);
            return Err(AuthError::InvalidCredentials);
        }
        log::info!("Admin {} logged in", email);
        self.signer.issue(&self.identity)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.signer.verify(token)
    }
}

pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

/// Proof that the request carried a valid admin token. Taking this as a
/// handler argument is what gates the handler.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Claims);

#[async_trait]
impl<B> FromRequest<B> for AdminSession
where
    B: Send,
{
    type Rejection = Error;

    async fn from_request(req: &mut RequestParts<B>) -> Result<Self, Self::Rejection> {
        let state = req
            .extensions()
            .get::<Arc<AppState>>()
            .cloned()
            .ok_or_else(|| Error::internal("StateError", "application state is missing"))?;
        let token = bearer_token(req.headers())?;
        let claims = state.credentials.verify(token)?;
        Ok(AdminSession(claims))
    }
}

pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    JsonBody(login): JsonBody<LoginAdmin>,
) -> Payload<LoggedInAdmin> {
    let email = login.email.unwrap_or_default();
    let password = login.password.unwrap_or_default();
    let (token, claims) = state.credentials.login(&email, &password)?;

    proceeds(LoggedInAdmin {
        token,
        user: claims.identity(),
        expires_at: claims.expires_at(),
    })
}

pub async fn verify(AdminSession(claims): AdminSession) -> Payload<VerifiedAdmin> {
    proceeds(VerifiedAdmin {
        message: "Token is valid".to_string(),
        user: claims.identity(),
        expires_at: claims.expires_at(),
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginAdmin {
    email: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedInAdmin {
    token: String,
    user: Identity,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedAdmin {
    message: String,
    user: Identity,
    expires_at: DateTime<Utc>,
}
