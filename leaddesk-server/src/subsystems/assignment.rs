//! Assignment engine
//!
//! Who holds a lead, who may move it, and what happens to leads and messages
//! when an agent account is removed.

use leaddesk_core::models::{Agent, AgentRole, Lead, NewAgent};
use leaddesk_core::store::{LeadFilter, ReassignmentReport};
use leaddesk_core::{LeadDeskError, Result, Session};
use uuid::Uuid;

use super::registry::AssigneeRef;
use crate::desk::LeadDesk;

impl LeadDesk {
    /// Owner only. Makes `target` the current assignee and records it at the
    /// head of the history, even if it held the lead before.
    pub async fn assign(&self, lead_id: Uuid, requester: Uuid, target: Uuid) -> Result<Lead> {
        self.require_owner_caller(requester, "reassign leads").await?;
        let target_agent = self.require_agent(target).await?;

        let lead = self
            .update_lead(lead_id, None, |lead| {
                lead.assign_to(target_agent.id);
                Ok(true)
            })
            .await?;

        tracing::info!(%lead_id, assignee = %target, "Lead reassigned");
        Ok(lead)
    }

    /// Candidates for reassignment: every agent but the current assignee.
    pub async fn assignable_agents(&self, lead_id: Uuid) -> Result<Vec<AssigneeRef>> {
        let lead = self.load_lead(lead_id).await?;
        let agents = self.call(self.store().list_agents()).await?;
        Ok(agents
            .into_iter()
            .filter(|a| a.id != lead.current_assignee)
            .map(|a| AssigneeRef {
                agent_id: a.id,
                name: a.display_name(),
            })
            .collect())
    }

    /// Deletes `removed` after moving everything it touched to the owner.
    ///
    /// Leads it currently holds go to the owner, its history entries are
    /// dropped and its messages are re-attributed. The store applies all of it
    /// with the delete, or none of it.
    pub async fn reassign_on_agent_removal(&self, removed: Uuid) -> Result<ReassignmentReport> {
        let owner = self.require_owner().await?;
        let report = self
            .call(self.store().delete_agent_with_reassignment(removed, owner.id))
            .await?;

        tracing::info!(
            agent_id = %removed,
            leads_reassigned = report.leads_reassigned,
            histories_rewritten = report.histories_rewritten,
            messages_reattributed = report.messages_reattributed,
            "Agent removed"
        );
        Ok(report)
    }

    /// Owner only. The owner account itself can go only once nothing else
    /// depends on it.
    pub async fn remove_agent(&self, requester: Uuid, target: Uuid) -> Result<ReassignmentReport> {
        self.require_owner_caller(requester, "remove agents").await?;
        let agent = self.require_agent(target).await?;

        if agent.is_owner() {
            let members = self.call(self.store().count_members()).await?;
            let filter = LeadFilter {
                worked_by: Some(agent.id),
                status: None,
            };
            let held = self.call(self.store().list_leads(&filter)).await?;
            if members > 0 || !held.is_empty() {
                tracing::warn!(members, leads = held.len(), "Refusing to delete the owner account");
                return Err(LeadDeskError::OwnerDeletionForbidden);
            }
        }

        self.reassign_on_agent_removal(target).await
    }

    /// Creates an agent. The very first one becomes the owner and needs no
    /// session; after that only the owner may add members.
    pub async fn register_agent(&self, session: Option<&Session>, draft: &NewAgent) -> Result<Agent> {
        let draft = draft.normalized()?;

        let owner = self.call(self.store().find_owner()).await?;
        let (role, parent) = match owner {
            None => (AgentRole::Owner, None),
            Some(owner) => {
                let session = session.ok_or_else(|| {
                    LeadDeskError::Unauthenticated("only the owner can add agents".to_string())
                })?;
                if session.agent_id != owner.id {
                    return Err(LeadDeskError::forbidden("only the owner can add agents"));
                }
                (AgentRole::Member, Some(owner.id))
            }
        };

        if self
            .call(self.store().find_agent_by_email(&draft.email))
            .await?
            .is_some()
        {
            return Err(LeadDeskError::Conflict(format!(
                "agent with email {} already exists",
                draft.email
            )));
        }

        let agent = draft.into_agent(role, parent, self.now());
        self.call(self.store().insert_agent(&agent)).await?;
        tracing::info!(agent_id = %agent.id, role = role.as_str(), "Agent registered");
        Ok(agent)
    }

    pub async fn list_agents(&self) -> Result<Vec<Agent>> {
        self.call(self.store().list_agents()).await
    }

    pub async fn agent_details(&self, agent_id: Uuid) -> Result<Agent> {
        self.require_agent(agent_id).await
    }

    /// Edits an agent's names, email and phone. The owner may edit anyone,
    /// members only themselves. Role and provenance never change here.
    pub async fn update_agent(&self, session: &Session, target: Uuid, draft: &NewAgent) -> Result<Agent> {
        if !session.is_owner() && session.agent_id != target {
            return Err(LeadDeskError::forbidden("agents can only edit their own details"));
        }
        let draft = draft.normalized()?;
        let current = self.require_agent(target).await?;

        if let Some(holder) = self
            .call(self.store().find_agent_by_email(&draft.email))
            .await?
        {
            if holder.id != target {
                return Err(LeadDeskError::Conflict(format!(
                    "agent with email {} already exists",
                    draft.email
                )));
            }
        }

        let updated = Agent {
            first_name: draft.first_name,
            last_name: draft.last_name,
            email: draft.email,
            phone: draft.phone,
            ..current
        };
        self.call(self.store().update_agent(&updated)).await?;
        tracing::info!(agent_id = %target, editor = %session.agent_id, "Agent details updated");
        Ok(updated)
    }
}
