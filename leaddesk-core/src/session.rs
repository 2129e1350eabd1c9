//! Agent sessions
//!
//! Tokens look like `<agent-id>.<expires-at>.<hex hmac-sha256>`. The role is
//! never carried in the token; it is read from the directory on every verify,
//! so a deleted agent loses access immediately.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LeadDeskError, Result};
use crate::models::AgentRole;
use crate::store::AgentDirectory;

/// The authenticated caller of an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Session {
    pub agent_id: Uuid,
    pub role: AgentRole,
}

impl Session {
    pub fn is_owner(&self) -> bool {
        self.role == AgentRole::Owner
    }
}

#[async_trait]
pub trait SessionVerifier: Send + Sync {
    /// Resolves a bearer token to a live session, or fails with `Unauthenticated`.
    async fn verify(&self, token: &str) -> Result<Session>;
}

/// Directory lookup deadline used until `with_lookup_timeout` says otherwise.
pub const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 5_000;

pub struct SignedTokenVerifier {
    secret: String,
    ttl: Duration,
    directory: Arc<dyn AgentDirectory>,
    clock: Arc<dyn Clock>,
    lookup_timeout: StdDuration,
}

impl SignedTokenVerifier {
    pub fn new(
        secret: impl Into<String>,
        ttl_seconds: i64,
        directory: Arc<dyn AgentDirectory>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let secret = secret.into();
        if secret.is_empty() {
            return Err(LeadDeskError::validation("token secret must not be empty"));
        }
        if ttl_seconds <= 0 {
            return Err(LeadDeskError::validation("token ttl must be positive"));
        }
        Ok(Self {
            secret,
            ttl: Duration::seconds(ttl_seconds),
            directory,
            clock,
            lookup_timeout: StdDuration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
        })
    }

    /// Bounds the per-request agent lookup, like every other store call.
    pub fn with_lookup_timeout(mut self, timeout_ms: u64) -> Self {
        self.lookup_timeout = StdDuration::from_millis(timeout_ms.max(1));
        self
    }

    /// Mints a token for `agent_id` valid for the configured ttl.
    pub fn issue(&self, agent_id: Uuid) -> Result<String> {
        let exp = (self.clock.now() + self.ttl).timestamp();
        let signature = self.sign(agent_id, exp)?;
        Ok(format!("{agent_id}.{exp}.{signature}"))
    }

    fn sign(&self, agent_id: Uuid, exp: i64) -> Result<String> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes())
            .map_err(|e| LeadDeskError::validation(format!("invalid token secret: {e}")))?;
        mac.update(format!("{agent_id}:{exp}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn check_signature(&self, agent_id: Uuid, exp: i64, signature: &str) -> bool {
        let Ok(signature_bytes) = hex::decode(signature.trim()) else {
            return false;
        };
        let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(self.secret.as_bytes()) else {
            return false;
        };
        mac.update(format!("{agent_id}:{exp}").as_bytes());
        mac.verify_slice(&signature_bytes).is_ok()
    }
}

#[async_trait]
impl SessionVerifier for SignedTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Session> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(agent), Some(exp), Some(signature)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(LeadDeskError::Unauthenticated("malformed token".to_string()));
        };

        let agent_id = Uuid::parse_str(agent)
            .map_err(|_| LeadDeskError::Unauthenticated("malformed token".to_string()))?;
        let exp: i64 = exp
            .parse()
            .map_err(|_| LeadDeskError::Unauthenticated("malformed token".to_string()))?;

        if !self.check_signature(agent_id, exp, signature) {
            return Err(LeadDeskError::Unauthenticated("bad signature".to_string()));
        }
        if exp < self.clock.now().timestamp() {
            return Err(LeadDeskError::Unauthenticated("token expired".to_string()));
        }

        let lookup = tokio::time::timeout(self.lookup_timeout, self.directory.find_agent(agent_id));
        let found = match lookup.await {
            Ok(found) => found?,
            Err(_) => {
                let ms = self.lookup_timeout.as_millis() as u64;
                tracing::warn!(timeout_ms = ms, %agent_id, "Session lookup timed out");
                return Err(LeadDeskError::Timeout(ms));
            }
        };
        let agent = found
            .ok_or_else(|| LeadDeskError::Unauthenticated("agent no longer exists".to_string()))?;

        Ok(Session {
            agent_id: agent.id,
            role: agent.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::NewAgent;
    use crate::store::MemoryStore;
    use chrono::Utc;

    async fn seeded() -> (Arc<MemoryStore>, Arc<ManualClock>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let agent = NewAgent {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: None,
        }
        .into_agent(AgentRole::Owner, None, clock.now());
        store.insert_agent(&agent).await.unwrap();
        (store, clock, agent.id)
    }

    #[tokio::test]
    async fn test_issued_token_verifies_with_directory_role() {
        let (store, clock, owner) = seeded().await;
        let verifier = SignedTokenVerifier::new("s3cret", 60, store, clock).unwrap();

        let token = verifier.issue(owner).unwrap();
        let session = verifier.verify(&token).await.unwrap();
        assert_eq!(session.agent_id, owner);
        assert!(session.is_owner());
    }

    #[tokio::test]
    async fn test_tampered_and_expired_tokens_are_rejected() {
        let (store, clock, owner) = seeded().await;
        let verifier = SignedTokenVerifier::new("s3cret", 60, store, clock.clone()).unwrap();
        let token = verifier.issue(owner).unwrap();

        let forged = format!("{}.{}.{}", Uuid::new_v4(), i64::MAX, "00ff");
        assert!(matches!(
            verifier.verify(&forged).await,
            Err(LeadDeskError::Unauthenticated(_))
        ));
        assert!(matches!(
            verifier.verify("garbage").await,
            Err(LeadDeskError::Unauthenticated(_))
        ));

        clock.advance(Duration::seconds(61));
        assert!(matches!(
            verifier.verify(&token).await,
            Err(LeadDeskError::Unauthenticated(_))
        ));
    }

    /// Directory whose lookups never finish in time.
    struct StalledDirectory;

    #[async_trait]
    impl AgentDirectory for StalledDirectory {
        async fn find_agent(&self, _id: Uuid) -> Result<Option<crate::models::Agent>> {
            tokio::time::sleep(StdDuration::from_millis(500)).await;
            Ok(None)
        }
        async fn find_owner(&self) -> Result<Option<crate::models::Agent>> {
            Ok(None)
        }
        async fn find_agent_by_email(&self, _email: &str) -> Result<Option<crate::models::Agent>> {
            Ok(None)
        }
        async fn list_agents(&self) -> Result<Vec<crate::models::Agent>> {
            Ok(Vec::new())
        }
        async fn count_members(&self) -> Result<u64> {
            Ok(0)
        }
        async fn insert_agent(&self, _agent: &crate::models::Agent) -> Result<()> {
            Ok(())
        }
        async fn update_agent(&self, agent: &crate::models::Agent) -> Result<()> {
            Err(LeadDeskError::AgentNotFound(agent.id))
        }
        async fn delete_agent_with_reassignment(
            &self,
            removed: Uuid,
            _owner: Uuid,
        ) -> Result<crate::store::ReassignmentReport> {
            Err(LeadDeskError::AgentNotFound(removed))
        }
    }

    #[tokio::test]
    async fn test_slow_directory_lookup_times_out() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let verifier = SignedTokenVerifier::new("s3cret", 60, Arc::new(StalledDirectory), clock)
            .unwrap()
            .with_lookup_timeout(20);
        let token = verifier.issue(Uuid::new_v4()).unwrap();

        assert!(matches!(
            verifier.verify(&token).await,
            Err(LeadDeskError::Timeout(20))
        ));
    }

    #[tokio::test]
    async fn test_deleted_agent_loses_access() {
        let (store, clock, _owner) = seeded().await;
        let verifier = SignedTokenVerifier::new("s3cret", 60, store, clock).unwrap();
        let token = verifier.issue(Uuid::new_v4()).unwrap();
        assert!(matches!(
            verifier.verify(&token).await,
            Err(LeadDeskError::Unauthenticated(_))
        ));
    }
}
