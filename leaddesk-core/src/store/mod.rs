//! Persistence collaborators
//!
//! The engine talks to storage only through these traits. Two backends ship
//! with the crate:
//! - [`MemoryStore`]: process-local, used by tests and the `memory` backend
//! - [`PgStore`]: PostgreSQL via sqlx
//!
//! Every lead mutation is a compare-and-set on `Lead::version`; the store is the
//! final arbiter of ticket uniqueness and of the single-owner rule.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Agent, ChatSettings, Lead, LeadStatus, Message};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Selection for [`LeadStore::list_leads`]. Results are ordered by `created_at` ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeadFilter {
    /// Only leads whose assignee history contains this agent.
    pub worked_by: Option<Uuid>,
    pub status: Option<LeadStatus>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(agent) = self.worked_by {
            if !lead.was_worked_by(agent) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if lead.status != status {
                return false;
            }
        }
        true
    }
}

/// Outcome of an agent delete with reference rewriting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReassignmentReport {
    pub leads_reassigned: u64,
    pub histories_rewritten: u64,
    pub messages_reattributed: u64,
}

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>>;

    /// The single lookup for the owner account.
    async fn find_owner(&self) -> Result<Option<Agent>>;

    async fn find_agent_by_email(&self, email: &str) -> Result<Option<Agent>>;

    async fn list_agents(&self) -> Result<Vec<Agent>>;

    async fn count_members(&self) -> Result<u64>;

    /// Fails with `Conflict` on a duplicate email or a second owner.
    async fn insert_agent(&self, agent: &Agent) -> Result<()>;

    /// Overwrites names, email and phone of an existing agent.
    /// Fails with `AgentNotFound`, or `Conflict` when another agent has the email.
    async fn update_agent(&self, agent: &Agent) -> Result<()>;

    /// Deletes `removed` after rewriting every lead and message reference to `owner`.
    /// Either everything commits or nothing does.
    async fn delete_agent_with_reassignment(
        &self,
        removed: Uuid,
        owner: Uuid,
    ) -> Result<ReassignmentReport>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Inserts the lead and its opening message together.
    /// Fails with `DuplicateKey` when the ticket id is taken.
    async fn insert_lead(&self, lead: &Lead, first_message: &Message) -> Result<()>;

    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>>;

    async fn find_lead_by_ticket(&self, ticket_id: &str) -> Result<Option<Lead>>;

    /// Advisory only; `insert_lead` decides.
    async fn ticket_exists(&self, ticket_id: &str) -> Result<bool>;

    /// Writes `next` (and `appended`, if any) only when the stored version still
    /// equals `expected_version`. Returns the stored lead with its bumped version,
    /// or `StaleVersion` when someone else got there first.
    async fn compare_and_swap_lead(
        &self,
        next: &Lead,
        expected_version: i64,
        appended: Option<&Message>,
    ) -> Result<Lead>;

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>>;

    /// Flags every unanswered, unflagged lead created before `cutoff`.
    /// Returns how many leads were flagged.
    async fn mark_missed_chats(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append_message(&self, message: &Message) -> Result<()>;

    /// Messages of one lead in creation order.
    async fn conversation(&self, lead_id: Uuid) -> Result<Vec<Message>>;

    async fn latest_contact_message(&self, lead_id: Uuid) -> Result<Option<Message>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fails with `Dependency` when settings were never initialised.
    async fn chat_settings(&self) -> Result<ChatSettings>;

    async fn save_chat_settings(&self, settings: &ChatSettings) -> Result<()>;

    /// Seeds defaults when nothing is stored yet. Returns true if it wrote.
    async fn ensure_default_settings(&self) -> Result<bool>;
}

#[async_trait]
pub trait StoreHealth: Send + Sync {
    /// Short description of the backend when it is reachable.
    async fn health(&self) -> Result<String>;
}

/// Everything the engine needs from persistence.
pub trait Store: AgentDirectory + LeadStore + MessageStore + SettingsStore + StoreHealth {}

impl<T> Store for T where
    T: AgentDirectory + LeadStore + MessageStore + SettingsStore + StoreHealth
{
}
