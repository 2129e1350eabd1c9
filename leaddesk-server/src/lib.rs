pub mod desk;
pub mod http;
pub mod subsystems;

use std::sync::Arc;

use leaddesk_core::{Clock, LeadDeskConfig, Result, SignedTokenVerifier, Store};

pub use desk::LeadDesk;
pub use http::HttpState;

/// Wires the engine and the session verifier over one store.
pub fn build_state<S>(store: Arc<S>, clock: Arc<dyn Clock>, config: &LeadDeskConfig) -> Result<HttpState>
where
    S: Store + 'static,
{
    let sessions = SignedTokenVerifier::new(
        config.service.token_secret.clone(),
        config.service.token_ttl_seconds,
        store.clone(),
        clock.clone(),
    )?
    .with_lookup_timeout(config.store.timeout_ms);
    let desk = LeadDesk::new(store, clock, config.store.timeout_ms);
    Ok(HttpState {
        desk,
        sessions: Arc::new(sessions),
    })
}
