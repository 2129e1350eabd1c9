//! The `LeadDesk` service façade
//!
//! Stateless over a shared store. Subsystem modules add their operations as
//! `impl LeadDesk` blocks; this file holds the plumbing they share: store-call
//! timeouts, owner/lead lookups and the compare-and-set loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use leaddesk_core::models::{Agent, Lead, Message};
use leaddesk_core::{Clock, LeadDeskError, Result, Store};
use uuid::Uuid;

/// Attempts before a contended lead mutation gives up with `Conflict`.
pub const MAX_CAS_ATTEMPTS: usize = 8;

#[derive(Clone)]
pub struct LeadDesk {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl LeadDesk {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, store_timeout_ms: u64) -> Self {
        Self {
            store,
            clock,
            store_timeout: Duration::from_millis(store_timeout_ms.max(1)),
        }
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Runs one store call under the configured deadline.
    pub(crate) async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.store_timeout.as_millis() as u64;
                tracing::warn!(timeout_ms = ms, "Store call timed out");
                Err(LeadDeskError::Timeout(ms))
            }
        }
    }

    pub(crate) async fn require_owner(&self) -> Result<Agent> {
        self.call(self.store.find_owner())
            .await?
            .ok_or(LeadDeskError::NoOwnerAgent)
    }

    pub(crate) async fn require_agent(&self, agent_id: Uuid) -> Result<Agent> {
        self.call(self.store.find_agent(agent_id))
            .await?
            .ok_or(LeadDeskError::AgentNotFound(agent_id))
    }

    /// Fails with `Forbidden` unless `agent_id` is the owner.
    pub(crate) async fn require_owner_caller(&self, agent_id: Uuid, action: &str) -> Result<Agent> {
        let agent = self
            .call(self.store.find_agent(agent_id))
            .await?
            .ok_or_else(|| LeadDeskError::forbidden(format!("unknown agent cannot {action}")))?;
        if !agent.is_owner() {
            return Err(LeadDeskError::forbidden(format!("only the owner can {action}")));
        }
        Ok(agent)
    }

    pub(crate) async fn load_lead(&self, lead_id: Uuid) -> Result<Lead> {
        self.call(self.store.find_lead(lead_id))
            .await?
            .ok_or_else(|| LeadDeskError::LeadNotFound(lead_id.to_string()))
    }

    /// Read, apply, compare-and-set; repeated on `StaleVersion`.
    ///
    /// `apply` runs against a fresh copy on every attempt and returns false to
    /// leave the lead untouched. `appended` is committed with the lead.
    pub(crate) async fn update_lead<F>(
        &self,
        lead_id: Uuid,
        appended: Option<&Message>,
        mut apply: F,
    ) -> Result<Lead>
    where
        F: FnMut(&mut Lead) -> Result<bool> + Send,
    {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let current = self.load_lead(lead_id).await?;
            let mut next = current.clone();
            if !apply(&mut next)? {
                return Ok(current);
            }
            next.updated_at = self.now();

            match self
                .call(
                    self.store
                        .compare_and_swap_lead(&next, current.version, appended),
                )
                .await
            {
                Ok(stored) => return Ok(stored),
                Err(LeadDeskError::StaleVersion { .. }) => {
                    tracing::debug!(%lead_id, attempt, "Lead changed underneath us, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(%lead_id, attempts = MAX_CAS_ATTEMPTS, "Lead update kept losing the race");
        Err(LeadDeskError::Conflict(format!(
            "lead {lead_id} is being modified concurrently"
        )))
    }
}
