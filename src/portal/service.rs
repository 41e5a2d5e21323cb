use tracing::{info, warn};

use super::cache::SessionStore;
use super::http_client::{Captcha, Credentials, LoginOutcome, PageFetcher, PortalClient};
use super::orchestrator::DashboardOrchestrator;
use super::types::DashboardSnapshot;
use crate::config::PortalConfig;
use crate::error::PortalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    NoActiveSession,
}

/// Session-cached dashboard access. Built once and shared by the caller.
///
/// Cache reads and writes are best effort: a failing cache behaves like a
/// miss and never fails the request.
pub struct DashboardService<F = PortalClient> {
    orchestrator: DashboardOrchestrator<F>,
    store: SessionStore,
    ttl_secs: u64,
}

impl DashboardService<PortalClient> {
    pub fn from_config(config: &PortalConfig) -> Result<Self, PortalError> {
        let client = PortalClient::new(config)?;
        let base = config.resolve("")?;
        let store = SessionStore::new(config.cache_db_path(), config.cache.key_prefix.clone());
        Ok(Self::new(
            DashboardOrchestrator::new(client, base),
            store,
            config.cache.ttl_secs,
        ))
    }

    /// Fetch the dashboard page for the session, then serve it like
    /// [`dashboard_from_html`](Self::dashboard_from_html).
    pub async fn dashboard(&self, session_id: &str) -> Result<DashboardSnapshot, PortalError> {
        if let Some(snapshot) = self.cached(session_id).await {
            return Ok(snapshot);
        }
        let html = self.orchestrator.fetcher().fetch_dashboard(session_id).await?;
        self.assemble_and_store(session_id, &html).await
    }

    /// Post the logout form with the cached state fields and drop the entry.
    pub async fn logout(&self, session_id: &str) -> Result<LogoutOutcome, PortalError> {
        let entry = match self.store.get(session_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(LogoutOutcome::NoActiveSession),
            Err(e) => {
                warn!("Cache read failed during logout for {}: {}", session_id, e);
                return Ok(LogoutOutcome::NoActiveSession);
            }
        };

        self.orchestrator
            .fetcher()
            .logout(session_id, &entry.hidden_fields)
            .await?;

        if let Err(e) = self.store.delete(session_id).await {
            warn!("Failed to drop cache entry for {}: {}", session_id, e);
        }
        Ok(LogoutOutcome::LoggedOut)
    }

    pub async fn login(
        &self,
        credentials: &Credentials,
        session_id: &str,
    ) -> Result<LoginOutcome, PortalError> {
        self.orchestrator.fetcher().login(credentials, session_id).await
    }

    pub async fn captcha(&self) -> Result<Captcha, PortalError> {
        self.orchestrator.fetcher().fetch_captcha().await
    }
}

impl<F: PageFetcher> DashboardService<F> {
    pub fn new(orchestrator: DashboardOrchestrator<F>, store: SessionStore, ttl_secs: u64) -> Self {
        Self {
            orchestrator,
            store,
            ttl_secs,
        }
    }

    pub fn orchestrator(&self) -> &DashboardOrchestrator<F> {
        &self.orchestrator
    }

    /// Serve from cache, or assemble from caller-supplied dashboard HTML and store.
    pub async fn dashboard_from_html(
        &self,
        session_id: &str,
        html: &str,
    ) -> Result<DashboardSnapshot, PortalError> {
        if let Some(snapshot) = self.cached(session_id).await {
            return Ok(snapshot);
        }
        self.assemble_and_store(session_id, html).await
    }

    /// Drop stale cache rows. Returns how many were removed.
    pub async fn clear_expired(&self) -> Result<usize, PortalError> {
        self.store.clear_expired().await
    }

    async fn cached(&self, session_id: &str) -> Option<DashboardSnapshot> {
        match self.store.get(session_id).await {
            Ok(Some(entry)) => {
                info!("Cache hit for session {}", session_id);
                Some(entry.snapshot)
            }
            Ok(None) => {
                info!("Cache miss for session {}", session_id);
                None
            }
            Err(e) => {
                warn!("Cache read failed for {}, treating as miss: {}", session_id, e);
                None
            }
        }
    }

    async fn assemble_and_store(
        &self,
        session_id: &str,
        html: &str,
    ) -> Result<DashboardSnapshot, PortalError> {
        let assembly = self.orchestrator.assemble(session_id, html).await?;
        if let Err(e) = self
            .store
            .put(session_id, &assembly.snapshot, &assembly.hidden_fields, self.ttl_secs)
            .await
        {
            warn!("Failed to cache dashboard for {}: {}", session_id, e);
        }
        Ok(assembly.snapshot)
    }
}
