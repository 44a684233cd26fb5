//! Authentication Module
//!
//! Caseworkers authenticate with the bearer token issued by the login
//! service (`Authorization: Bearer <jwt>`). This module verifies that token
//! and turns its claims into a [`CaseworkerIdentity`].
//!
//! Verification sits behind the [`AuthGateway`] trait so the HTTP layer never
//! depends on how credentials are checked.

use crate::error::{ApiError, ApiResult};
use ::async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sictax_core::UserId;
use std::sync::Arc;

const INSECURE_DEFAULT_SECRET: &str = "INSECURE_DEFAULT_SECRET_CHANGE_IN_PRODUCTION";

/// Tokens from the login service live for one day.
const DEFAULT_EXPIRATION_SECS: i64 = 86_400;

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock used for token expiry checks.
///
/// `jsonwebtoken` is only asked to check the signature; expiry is checked
/// against this clock so tests can pin time.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

/// Test clock helpers for common scenarios.
pub mod test_clocks {
    use super::FixedClock;

    /// 2024-01-01 00:00:00 UTC
    pub fn valid() -> FixedClock {
        FixedClock(1704067200)
    }

    /// 2030-01-01 00:00:00 UTC
    pub fn future() -> FixedClock {
        FixedClock(1893456000)
    }
}

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// JWT signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// Create a new JWT secret.
    ///
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> ApiResult<Self> {
        if secret.trim().is_empty() {
            return Err(ApiError::invalid_input("JWT secret must not be empty"));
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    fn insecure_default() -> Self {
        Self(SecretString::new(INSECURE_DEFAULT_SECRET.into()))
    }

    /// Expose the secret value for cryptographic operations.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Length of the secret without exposing it.
    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// Secret shared with the login service
    pub jwt_secret: JwtSecret,

    /// JWT algorithm (HS256, as issued by the login service)
    pub jwt_algorithm: Algorithm,

    /// Lifetime of tokens minted by [`generate_jwt_token`]
    pub jwt_expiration_secs: i64,

    /// Tolerated clock drift when checking `exp`
    pub jwt_clock_skew_secs: i64,

    /// Clock for expiry checks (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_clock_skew_secs", &self.jwt_clock_skew_secs)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: JwtSecret::insecure_default(),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_EXPIRATION_SECS,
            jwt_clock_skew_secs: 60,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// Create authentication configuration from environment variables.
    ///
    /// # Environment Variables
    /// - `SICTAX_JWT_SECRET` (fallback `JWT_SECRET`): JWT signing secret
    /// - `SICTAX_JWT_EXPIRATION_SECS`: token lifetime (default: 86400)
    /// - `SICTAX_JWT_CLOCK_SKEW_SECS`: clock skew tolerance (default: 60)
    pub fn from_env() -> Self {
        let jwt_secret = std::env::var("SICTAX_JWT_SECRET")
            .or_else(|_| std::env::var("JWT_SECRET"))
            .ok()
            .and_then(|s| JwtSecret::new(s).ok())
            .unwrap_or_else(JwtSecret::insecure_default);

        Self {
            jwt_secret,
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: std::env::var("SICTAX_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_EXPIRATION_SECS),
            jwt_clock_skew_secs: std::env::var("SICTAX_JWT_CLOCK_SKEW_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(60),
            clock: Arc::new(SystemClock),
        }
    }

    /// Refuse insecure secrets when `SICTAX_ENVIRONMENT` is production.
    ///
    /// Outside production the server starts anyway and logs a warning.
    pub fn validate_for_production(&self) -> ApiResult<()> {
        let environment = std::env::var("SICTAX_ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase();
        let is_production = environment == "production" || environment == "prod";

        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "Cannot start server in production with insecure JWT secret. \
                     Set SICTAX_JWT_SECRET to a secure value. SICTAX_ENVIRONMENT={}",
                    environment
                )));
            }
            tracing::warn!(
                "Using insecure default JWT secret. Set SICTAX_JWT_SECRET before deploying."
            );
        } else if self.jwt_secret.len() < 32 {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least 32 characters long.",
                    self.jwt_secret.len()
                )));
            }
            tracing::warn!(
                chars = self.jwt_secret.len(),
                "JWT secret is short; use at least 32 characters in production"
            );
        }

        Ok(())
    }
}

// ============================================================================
// JWT CLAIMS AND IDENTITY
// ============================================================================

/// Claims carried by login-service tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub login_name: String,

    #[serde(default)]
    pub primer_nombre: Option<String>,

    #[serde(default)]
    pub cargo: Option<String>,

    /// Numeric user id, when the issuer includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idusuario: Option<i64>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(login_name: impl Into<String>, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            login_name: login_name.into(),
            primer_nombre: None,
            cargo: None,
            idusuario: None,
            iat: now,
            exp: now + expiration_secs,
        }
    }

    pub fn with_profile(mut self, primer_nombre: impl Into<String>, cargo: impl Into<String>) -> Self {
        self.primer_nombre = Some(primer_nombre.into());
        self.cargo = Some(cargo.into());
        self
    }

    pub fn with_user_id(mut self, idusuario: i64) -> Self {
        self.idusuario = Some(idusuario);
        self
    }

    pub fn is_expired(&self, clock: &dyn JwtClock) -> bool {
        self.exp < clock.now_epoch_secs()
    }
}

/// Authenticated caseworker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseworkerIdentity {
    pub login_name: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    pub user_id: Option<UserId>,
}

impl From<Claims> for CaseworkerIdentity {
    fn from(claims: Claims) -> Self {
        Self {
            login_name: claims.login_name,
            display_name: claims.primer_nombre,
            role: claims.cargo,
            user_id: claims.idusuario.map(UserId::from),
        }
    }
}

// ============================================================================
// TOKEN VALIDATION
// ============================================================================

fn validate_expiry(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Validate a JWT token and extract claims.
///
/// Signature and shape are checked by `jsonwebtoken`; expiry is checked
/// against `config.clock`.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Token signature is invalid")
            }
            _ => ApiError::invalid_token("Token is invalid"),
        })?;

    let claims = token_data.claims;
    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(
            timestamp = now,
            "System clock returned pre-epoch time - server time is broken"
        );
        return Err(ApiError::internal_error(
            "Server time configuration error - please contact support",
        ));
    }

    validate_expiry(now, claims.exp, config.jwt_clock_skew_secs)?;
    Ok(claims)
}

/// Mint a token the way the login service does.
///
/// There is no login endpoint here; this exists for tests and tooling.
pub fn generate_jwt_token(config: &AuthConfig, claims: &Claims) -> ApiResult<String> {
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, claims, &encoding_key)
        .map_err(|e| ApiError::internal_error(format!("Failed to generate token: {}", e)))
}

/// Pull the token out of an `Authorization` header value.
pub fn extract_bearer_token(header_value: &str) -> ApiResult<&str> {
    let mut parts = header_value.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().map(str::trim).unwrap_or_default();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ApiError::invalid_token(
            "Authorization header must use the Bearer scheme",
        ));
    }
    Ok(token)
}

// ============================================================================
// AUTH GATEWAY
// ============================================================================

/// Turns a raw `Authorization` header into a caseworker identity.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn authenticate(&self, authorization: Option<&str>) -> ApiResult<CaseworkerIdentity>;
}

/// [`AuthGateway`] that verifies login-service JWTs locally.
#[derive(Debug, Clone)]
pub struct JwtAuthGateway {
    config: AuthConfig,
}

impl JwtAuthGateway {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }
}

#[async_trait]
impl AuthGateway for JwtAuthGateway {
    async fn authenticate(&self, authorization: Option<&str>) -> ApiResult<CaseworkerIdentity> {
        let header = authorization.ok_or_else(|| {
            ApiError::unauthorized("Acceso denegado. No se ha proporcionado un token")
        })?;
        let token = extract_bearer_token(header)?;
        let claims = validate_jwt_token(&self.config, token)?;
        Ok(claims.into())
    }
}
