use crate::abuse::AbuseConfig;
use crate::auth::AuthConfig;
use crate::identity::IdentityConfig;
use crate::ledger::VoteLedger;
use crate::store::MemoryStore;
use crate::tabulator::Tabulator;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub ledger: VoteLedger,
    pub tabulator: Tabulator,
    pub identity: Arc<IdentityConfig>,
    pub abuse: Arc<AbuseConfig>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<MemoryStore>,
        identity: IdentityConfig,
        abuse: AbuseConfig,
        auth: AuthConfig,
    ) -> Self {
        Self {
            ledger: VoteLedger::new(store.clone()),
            tabulator: Tabulator::new(store.clone()),
            store,
            identity: Arc::new(identity),
            abuse: Arc::new(abuse),
            auth: Arc::new(auth),
        }
    }

    /// In-memory state with default identity, no rate limit and no admin auth
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            IdentityConfig::default(),
            AbuseConfig::disabled(),
            AuthConfig::disabled(),
        )
    }
}

impl FromRef<AppState> for Arc<IdentityConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.identity.clone()
    }
}

impl FromRef<AppState> for Arc<AuthConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
