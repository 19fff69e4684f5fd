use earshot_platforms::PlatformError;
use earshot_schema::Platform;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum ListenError {
    #[error("no connected integrations for tenant {tenant_id}")]
    NoIntegrations { tenant_id: String },
    #[error("a listener is already active for tenant {tenant_id}")]
    AlreadyActive { tenant_id: String },
    #[error("no active listener for tenant {tenant_id}")]
    NotActive { tenant_id: String },
    #[error("{platform} credentials expired: {message}")]
    AuthExpired { platform: Platform, message: String },
    #[error("{platform} stream failed: {message}")]
    StreamTransport { platform: Platform, message: String },
    #[error("post cannot be classified: {0}")]
    ClassificationInput(String),
    #[error("action execution failed: {0}")]
    Execution(String),
    #[error("approval request {0} not found")]
    ApprovalNotFound(Uuid),
    #[error("approval request {0} was already decided")]
    ApprovalAlreadyDecided(Uuid),
    #[error("reply generation failed: {0}")]
    Generation(String),
    #[error("invalid listener config: {0}")]
    InvalidConfig(String),
    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl ListenError {
    /// Maps an adapter failure raised while streaming.
    pub fn stream(platform: Platform, err: PlatformError) -> Self {
        match err {
            PlatformError::AuthExpired(message) => ListenError::AuthExpired { platform, message },
            other => ListenError::StreamTransport {
                platform,
                message: other.to_string(),
            },
        }
    }

    /// Maps an adapter failure raised while executing an action.
    pub fn execution(platform: Platform, err: PlatformError) -> Self {
        match err {
            PlatformError::AuthExpired(message) => ListenError::AuthExpired { platform, message },
            other => ListenError::Execution(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_failures_keep_their_kind() {
        let err = ListenError::stream(Platform::Twitter, PlatformError::AuthExpired("gone".into()));
        assert!(matches!(err, ListenError::AuthExpired { .. }));

        let err = ListenError::execution(
            Platform::Twitter,
            PlatformError::Api {
                status: 500,
                message: "boom".into(),
            },
        );
        assert_eq!(
            err.to_string(),
            "action execution failed: platform api error (500): boom"
        );
    }

    #[test]
    fn store_errors_render_context_chain() {
        let err: ListenError = anyhow::anyhow!("disk full").context("save trigger").into();
        assert_eq!(err.to_string(), "store error: save trigger: disk full");
    }
}
