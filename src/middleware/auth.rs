//! Bearer token authentication middleware
//!
//! Provides role-based access control for gateway routes.
//!
//! Roles:
//! - `read`: Request download URLs
//! - `write`: Request upload URLs
//! - `admin`: Full access
//!
//! The authenticated user is contributed to the chain context under `user`.

use crate::chain::{
    ContextDelta, MiddlewareConfig, MiddlewareContext, Step, StepResult, StorageMiddleware,
};
use crate::error::{ErrorCode, SetupError, StorageError};
use crate::request::GatewayRequest;
use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Context key of the authenticated user
pub const USER_CONTEXT_KEY: &str = "user";

/// User roles for authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Read-only access
    Read,
    /// Read and write access
    Write,
    /// Full admin access
    Admin,
}

impl Role {
    /// Check if this role has at least the required permission level
    pub fn has_permission(&self, required: Role) -> bool {
        *self >= required
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Read => write!(f, "read"),
            Role::Write => write!(f, "write"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Role::Read),
            "write" => Ok(Role::Write),
            "admin" => Ok(Role::Admin),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Authenticated user information
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedUser {
    /// Masked credential the user authenticated with
    pub identifier: String,
    /// The user's role
    pub role: Role,
}

/// Resolves the caller of a request
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// `None` when the request carries no valid credentials
    async fn authenticate(&self, request: &GatewayRequest) -> Option<AuthenticatedUser>;
}

/// Bearer API keys held in memory
#[derive(Clone, Default)]
pub struct ApiKeyAuthenticator {
    /// In-memory cache of API keys to roles
    api_keys: Arc<RwLock<HashMap<String, Role>>>,
}

impl ApiKeyAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an authenticator with pre-configured API keys
    pub fn with_keys(api_keys: HashMap<String, Role>) -> Self {
        Self {
            api_keys: Arc::new(RwLock::new(api_keys)),
        }
    }

    /// Add an API key at runtime
    pub async fn add_api_key(&self, key: String, role: Role) {
        let mut keys = self.api_keys.write().await;
        keys.insert(key, role);
    }

    /// Remove an API key at runtime
    pub async fn remove_api_key(&self, key: &str) {
        let mut keys = self.api_keys.write().await;
        keys.remove(key);
    }

    async fn check_api_key(&self, key: &str) -> Option<Role> {
        let keys = self.api_keys.read().await;
        keys.get(key).copied()
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &GatewayRequest) -> Option<AuthenticatedUser> {
        let token = bearer_token(request.header(AUTHORIZATION.as_str())?)?;

        match self.check_api_key(token).await {
            Some(role) => Some(AuthenticatedUser {
                identifier: mask_token(token),
                role,
            }),
            None => {
                tracing::warn!(
                    token_prefix = %mask_token(token),
                    "Authentication failed - invalid token"
                );
                None
            }
        }
    }
}

/// Token of a `Bearer <token>` header value
fn bearer_token(header: &str) -> Option<&str> {
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

fn mask_token(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{}…", prefix)
}

/// Construction options for [`auth_middleware`]
#[derive(Debug, Clone, Default)]
pub struct AuthOptions {
    /// Minimum role; any authenticated user passes when unset
    pub required_role: Option<Role>,
    pub skip_paths: Option<Vec<String>>,
    pub include_paths: Option<Vec<String>>,
}

/// Build the authentication middleware around `authenticator`
pub fn auth_middleware(
    authenticator: Arc<dyn Authenticator>,
    options: AuthOptions,
) -> Result<StorageMiddleware, SetupError> {
    let config = MiddlewareConfig {
        name: "auth".to_string(),
        skip_paths: options.skip_paths,
        include_paths: options.include_paths,
    };
    let required = options.required_role;

    StorageMiddleware::new(config, move |ctx: MiddlewareContext| {
        let authenticator = authenticator.clone();
        async move {
            let user = authenticator
                .authenticate(&ctx.request)
                .await
                .ok_or_else(|| {
                    StorageError::new(ErrorCode::Unauthorized, "Missing or invalid bearer token")
                        .with_origin(crate::error::ErrorOrigin::Client)
                })?;

            if let Some(required) = required {
                if !user.role.has_permission(required) {
                    tracing::warn!(
                        identifier = %user.identifier,
                        user_role = %user.role,
                        required_role = %required,
                        "Authorization failed - insufficient permissions"
                    );
                    return StepResult::Err(
                        StorageError::new(
                            ErrorCode::Forbidden,
                            format!("Requires {} role or higher", required),
                        )
                        .into(),
                    );
                }
            }

            tracing::debug!(identifier = %user.identifier, role = %user.role, "User authenticated");
            StepResult::Ok(Step::merge(
                ContextDelta::new().insert(USER_CONTEXT_KEY, user),
            ))
        }
    })
}
