use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AgentDirectory, LeadFilter, LeadStore, MessageStore, ReassignmentReport, SettingsStore,
    StoreHealth,
};
use crate::error::{LeadDeskError, Result};
use crate::models::{Agent, AgentRole, ChatSettings, Lead, Message, MessageAuthor};

#[derive(Debug, Default)]
struct MemoryState {
    agents: HashMap<Uuid, Agent>,
    leads: HashMap<Uuid, Lead>,
    tickets: HashMap<String, Uuid>,
    /// Insertion order doubles as the tie-break for equal timestamps.
    messages: Vec<Message>,
    settings: Option<ChatSettings>,
}

/// Process-local store. A single write lock makes every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AgentDirectory for MemoryStore {
    async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        Ok(self.state.read().await.agents.get(&id).cloned())
    }

    async fn find_owner(&self) -> Result<Option<Agent>> {
        let state = self.state.read().await;
        Ok(state.agents.values().find(|a| a.is_owner()).cloned())
    }

    async fn find_agent_by_email(&self, email: &str) -> Result<Option<Agent>> {
        let state = self.state.read().await;
        Ok(state
            .agents
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let state = self.state.read().await;
        let mut agents: Vec<Agent> = state.agents.values().cloned().collect();
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn count_members(&self) -> Result<u64> {
        let state = self.state.read().await;
        Ok(state
            .agents
            .values()
            .filter(|a| a.role == AgentRole::Member)
            .count() as u64)
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .agents
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&agent.email))
        {
            return Err(LeadDeskError::Conflict(format!(
                "agent with email {} already exists",
                agent.email
            )));
        }
        if agent.is_owner() && state.agents.values().any(|a| a.is_owner()) {
            return Err(LeadDeskError::Conflict("an owner agent already exists".to_string()));
        }
        state.agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn update_agent(&self, agent: &Agent) -> Result<()> {
        let mut state = self.state.write().await;
        if state
            .agents
            .values()
            .any(|a| a.id != agent.id && a.email.eq_ignore_ascii_case(&agent.email))
        {
            return Err(LeadDeskError::Conflict(format!(
                "agent with email {} already exists",
                agent.email
            )));
        }
        let stored = state
            .agents
            .get_mut(&agent.id)
            .ok_or(LeadDeskError::AgentNotFound(agent.id))?;
        stored.first_name = agent.first_name.clone();
        stored.last_name = agent.last_name.clone();
        stored.email = agent.email.clone();
        stored.phone = agent.phone.clone();
        Ok(())
    }

    async fn delete_agent_with_reassignment(
        &self,
        removed: Uuid,
        owner: Uuid,
    ) -> Result<ReassignmentReport> {
        let mut state = self.state.write().await;
        if !state.agents.contains_key(&removed) {
            return Err(LeadDeskError::AgentNotFound(removed));
        }
        if !state.agents.contains_key(&owner) {
            return Err(LeadDeskError::NoOwnerAgent);
        }

        let mut report = ReassignmentReport::default();
        let now = Utc::now();

        // Build the rewritten rows first, then swap them in.
        let mut rewritten = Vec::new();
        for lead in state.leads.values() {
            if !lead.references(removed) {
                continue;
            }
            let mut next = lead.clone();
            if next.is_assigned_to(removed) {
                report.leads_reassigned += 1;
            }
            if next.was_worked_by(removed) {
                report.histories_rewritten += 1;
            }
            next.reassign_from(removed, owner);
            next.version += 1;
            next.updated_at = now;
            rewritten.push(next);
        }

        for lead in rewritten {
            state.leads.insert(lead.id, lead);
        }
        for message in state.messages.iter_mut() {
            if message.author == MessageAuthor::Agent && message.agent_id == Some(removed) {
                message.agent_id = Some(owner);
                report.messages_reattributed += 1;
            }
        }
        for agent in state.agents.values_mut() {
            if agent.parent == Some(removed) {
                agent.parent = None;
            }
        }
        state.agents.remove(&removed);

        Ok(report)
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_lead(&self, lead: &Lead, first_message: &Message) -> Result<()> {
        let mut state = self.state.write().await;
        if state.tickets.contains_key(&lead.ticket_id) {
            return Err(LeadDeskError::DuplicateKey(lead.ticket_id.clone()));
        }
        state.tickets.insert(lead.ticket_id.clone(), lead.id);
        state.leads.insert(lead.id, lead.clone());
        state.messages.push(first_message.clone());
        Ok(())
    }

    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        Ok(self.state.read().await.leads.get(&id).cloned())
    }

    async fn find_lead_by_ticket(&self, ticket_id: &str) -> Result<Option<Lead>> {
        let state = self.state.read().await;
        Ok(state
            .tickets
            .get(ticket_id)
            .and_then(|id| state.leads.get(id))
            .cloned())
    }

    async fn ticket_exists(&self, ticket_id: &str) -> Result<bool> {
        Ok(self.state.read().await.tickets.contains_key(ticket_id))
    }

    async fn compare_and_swap_lead(
        &self,
        next: &Lead,
        expected_version: i64,
        appended: Option<&Message>,
    ) -> Result<Lead> {
        let mut state = self.state.write().await;
        let current = state
            .leads
            .get(&next.id)
            .ok_or_else(|| LeadDeskError::LeadNotFound(next.id.to_string()))?;
        if current.version != expected_version {
            return Err(LeadDeskError::StaleVersion {
                lead: next.id,
                expected: expected_version,
            });
        }
        // an agent may have been deleted since `next` was read
        if let Some(missing) = next
            .referenced_agents()
            .into_iter()
            .chain(appended.and_then(|m| m.agent_id))
            .find(|id| !state.agents.contains_key(id))
        {
            return Err(LeadDeskError::AgentNotFound(missing));
        }

        let mut stored = next.clone();
        stored.version = expected_version + 1;
        state.leads.insert(stored.id, stored.clone());
        if let Some(message) = appended {
            state.messages.push(message.clone());
        }
        Ok(stored)
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let state = self.state.read().await;
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|lead| filter.matches(lead))
            .cloned()
            .collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.ticket_id.cmp(&b.ticket_id)));
        Ok(leads)
    }

    async fn mark_missed_chats(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut flagged = 0;
        for lead in state.leads.values_mut() {
            if lead.responded_at.is_none() && !lead.is_missed_chat && lead.created_at < cutoff {
                lead.is_missed_chat = true;
                lead.version += 1;
                lead.updated_at = now;
                flagged += 1;
            }
        }
        Ok(flagged)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn append_message(&self, message: &Message) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.leads.contains_key(&message.lead_id) {
            return Err(LeadDeskError::LeadNotFound(message.lead_id.to_string()));
        }
        state.messages.push(message.clone());
        Ok(())
    }

    async fn conversation(&self, lead_id: Uuid) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.lead_id == lead_id)
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal timestamps
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn latest_contact_message(&self, lead_id: Uuid) -> Result<Option<Message>> {
        let conversation = self.conversation(lead_id).await?;
        Ok(conversation
            .into_iter()
            .rev()
            .find(|m| m.author == MessageAuthor::Lead))
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn chat_settings(&self) -> Result<ChatSettings> {
        self.state
            .read()
            .await
            .settings
            .ok_or_else(|| LeadDeskError::Dependency("chat settings are not initialised".to_string()))
    }

    async fn save_chat_settings(&self, settings: &ChatSettings) -> Result<()> {
        self.state.write().await.settings = Some(*settings);
        Ok(())
    }

    async fn ensure_default_settings(&self) -> Result<bool> {
        let mut state = self.state.write().await;
        if state.settings.is_some() {
            return Ok(false);
        }
        state.settings = Some(ChatSettings::default());
        Ok(true)
    }
}

#[async_trait]
impl StoreHealth for MemoryStore {
    async fn health(&self) -> Result<String> {
        let state = self.state.read().await;
        Ok(format!(
            "memory ({} agents, {} leads)",
            state.agents.len(),
            state.leads.len()
        ))
    }
}
