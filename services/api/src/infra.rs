use metrics_exporter_prometheus::PrometheusHandle;
use nexus_polls::auth::{InMemoryUserDirectory, TokenIssuer};
use nexus_polls::config::AuthConfig;
use nexus_polls::polls::{InMemoryPollStore, PollService};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Operational state shared with the health, readiness, and metrics endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// In-process backends the HTTP service runs on.
pub(crate) struct Backends {
    pub(crate) polls: Arc<PollService<InMemoryPollStore>>,
    pub(crate) users: Arc<InMemoryUserDirectory>,
    pub(crate) tokens: Arc<TokenIssuer>,
}

impl Backends {
    pub(crate) fn in_memory(auth: &AuthConfig) -> Self {
        Self {
            polls: Arc::new(PollService::new(Arc::new(InMemoryPollStore::default()))),
            users: Arc::new(InMemoryUserDirectory::default()),
            tokens: Arc::new(TokenIssuer::new(auth)),
        }
    }
}
