use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use earshot_schema::{Credentials, Integration, IntegrationStatus};
use earshot_store::IntegrationStore;
use tokio::sync::Mutex;

use crate::PlatformError;

/// Exchanges a refresh token for a new credential set.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<Credentials, PlatformError>;
}

/// Hands out a valid access token, refreshing and persisting it first when it
/// is about to expire.
pub struct CredentialManager {
    integration_id: String,
    current: Mutex<Credentials>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    store: Arc<dyn IntegrationStore>,
    skew: Duration,
}

impl CredentialManager {
    pub fn new(
        integration: &Integration,
        refresher: Option<Arc<dyn TokenRefresher>>,
        store: Arc<dyn IntegrationStore>,
    ) -> Self {
        Self {
            integration_id: integration.id.clone(),
            current: Mutex::new(integration.credentials.clone()),
            refresher,
            store,
            skew: Duration::seconds(60),
        }
    }

    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    pub async fn access_token(&self) -> Result<String, PlatformError> {
        let mut current = self.current.lock().await;
        if !current.is_expiring(Utc::now(), self.skew) {
            return Ok(current.access_token.clone());
        }

        let refreshed = match self.try_refresh(&current).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                tracing::warn!(
                    integration_id = %self.integration_id,
                    error = %e,
                    "token refresh failed, marking integration expired"
                );
                if let Err(store_err) = self
                    .store
                    .set_integration_status(&self.integration_id, IntegrationStatus::Expired)
                    .await
                {
                    tracing::error!(
                        integration_id = %self.integration_id,
                        error = %store_err,
                        "failed to record expired integration"
                    );
                }
                return Err(PlatformError::AuthExpired(e.to_string()));
            }
        };

        self.store
            .update_credentials(&self.integration_id, &refreshed)
            .await
            .map_err(|e| PlatformError::Store(e.to_string()))?;
        tracing::info!(integration_id = %self.integration_id, "access token refreshed");

        let token = refreshed.access_token.clone();
        *current = refreshed;
        Ok(token)
    }

    async fn try_refresh(&self, current: &Credentials) -> Result<Credentials, PlatformError> {
        let refresh_token = current
            .refresh_token
            .as_deref()
            .ok_or_else(|| PlatformError::AuthExpired("no refresh token stored".into()))?;
        let refresher = self
            .refresher
            .as_ref()
            .ok_or_else(|| PlatformError::AuthExpired("platform has no token refresher".into()))?;

        let mut refreshed = refresher.refresh(refresh_token).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = current.refresh_token.clone();
        }
        Ok(refreshed)
    }
}
