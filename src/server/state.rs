use super::error::ApiError;
use crate::account::Account;
use crate::config::{ScanConfig, ServerConfig};
use crate::error::ScanError;
use crate::extract::AiMenuService;
use crate::pipeline::vision::{LlmVisionModel, UnavailableModel, VisionModel};
use crate::quota::QuotaGate;
use crate::store::{AccountStore, SqliteStore};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tracing::{info, warn};

pub struct AppState {
    pub store: Arc<SqliteStore>,
    pub ai: AiMenuService,
    pub config: Arc<ScanConfig>,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, model: Arc<dyn VisionModel>, config: Arc<ScanConfig>) -> Arc<Self> {
        let quota = QuotaGate::new(store.clone(), config.free_tier_limit);
        let ai = AiMenuService::new(model, quota, config.clone());
        Arc::new(Self { store, ai, config })
    }

    /// Open the configured database and resolve the vision provider.
    ///
    /// A missing provider does not stop the server: the extraction endpoint
    /// answers 500 with the configuration hint and everything else works.
    pub fn from_config(server: &ServerConfig, scan: ScanConfig) -> Result<Arc<Self>, ScanError> {
        let store = match &server.database {
            Some(path) => SqliteStore::open(path)?,
            None => {
                info!("No database configured, using in-memory store");
                SqliteStore::in_memory()?
            }
        };

        let model: Arc<dyn VisionModel> = match LlmVisionModel::from_config(&scan) {
            Ok(model) => Arc::new(model),
            Err(e) => {
                warn!("Vision provider unavailable: {}", e);
                Arc::new(UnavailableModel::new(e))
            }
        };

        Ok(Self::new(Arc::new(store), model, Arc::new(scan)))
    }
}

/// The session token from the `session` cookie or a bearer header.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == "session")
        .map(|(_, value)| value.to_string());

    from_cookie.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    })
    .filter(|t| !t.is_empty())
}

/// The signed-in account, if any.
pub struct MaybeUser(pub Option<Account>);

/// The signed-in account; rejects with 401 otherwise.
pub struct User(pub Account);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let account = match session_token(&parts.headers) {
            Some(token) => state.store.account_for_session(&token)?,
            None => None,
        };
        Ok(MaybeUser(account))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let MaybeUser(account) = MaybeUser::from_request_parts(parts, state).await?;
        account.map(User).ok_or(ApiError::Scan(ScanError::Unauthenticated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_from_cookie_or_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc123"));
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz"));

        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
