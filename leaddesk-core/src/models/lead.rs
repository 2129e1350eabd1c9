use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Unresolved,
    Resolved,
}

impl LeadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LeadStatus::Unresolved => "unresolved",
            LeadStatus::Resolved => "resolved",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unresolved" => Some(LeadStatus::Unresolved),
            "resolved" => Some(LeadStatus::Resolved),
            _ => None,
        }
    }
}

/// First-response state of a lead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaState {
    AwaitingFirstResponse,
    Responded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: Uuid,
    pub ticket_id: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub is_first_message_shared: bool,
    pub is_detail_shared: bool,
    pub status: LeadStatus,
    pub is_missed_chat: bool,
    pub response_time_seconds: i64,
    pub responded_at: Option<DateTime<Utc>>,
    pub current_assignee: Uuid,
    /// Most recent first. Keeps duplicates: it is a history, not a set.
    pub assignee_list: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Lead {
    /// A freshly opened lead, held by `owner`, with the first message already shared.
    pub fn open(ticket_id: String, owner: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticket_id,
            contact_name: None,
            contact_email: None,
            contact_phone: None,
            is_first_message_shared: true,
            is_detail_shared: false,
            status: LeadStatus::Unresolved,
            is_missed_chat: false,
            response_time_seconds: 0,
            responded_at: None,
            current_assignee: owner,
            assignee_list: vec![owner],
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn sla_state(&self) -> SlaState {
        if self.responded_at.is_some() {
            SlaState::Responded
        } else {
            SlaState::AwaitingFirstResponse
        }
    }

    pub fn is_assigned_to(&self, agent: Uuid) -> bool {
        self.current_assignee == agent
    }

    /// True when `agent` has ever held this lead.
    pub fn was_worked_by(&self, agent: Uuid) -> bool {
        self.assignee_list.contains(&agent)
    }

    pub fn references(&self, agent: Uuid) -> bool {
        self.is_assigned_to(agent) || self.was_worked_by(agent)
    }

    /// Every agent this lead points at, current assignee first, without repeats.
    pub fn referenced_agents(&self) -> Vec<Uuid> {
        let mut agents = vec![self.current_assignee];
        for id in &self.assignee_list {
            if !agents.contains(id) {
                agents.push(*id);
            }
        }
        agents
    }

    pub fn assign_to(&mut self, agent: Uuid) {
        self.current_assignee = agent;
        self.assignee_list.insert(0, agent);
    }

    /// Rewrites every reference to `removed` so the lead points at `owner` instead.
    ///
    /// All occurrences of `removed` leave the history. The owner is added when
    /// absent, and moved to the front whenever it takes over as current assignee,
    /// so the current assignee stays the head of the list.
    /// Returns false when the lead never referenced `removed`.
    pub fn reassign_from(&mut self, removed: Uuid, owner: Uuid) -> bool {
        if !self.references(removed) {
            return false;
        }

        let takes_over = self.current_assignee == removed;
        self.assignee_list.retain(|id| *id != removed);

        if takes_over {
            self.current_assignee = owner;
            if let Some(pos) = self.assignee_list.iter().position(|id| *id == owner) {
                self.assignee_list.remove(pos);
            }
            self.assignee_list.insert(0, owner);
        } else if !self.assignee_list.contains(&owner) {
            self.assignee_list.push(owner);
        }
        true
    }
}

/// Contact-supplied form values, already trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}
