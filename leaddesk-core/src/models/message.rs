use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageAuthor {
    Lead,
    Agent,
}

impl MessageAuthor {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageAuthor::Lead => "lead",
            MessageAuthor::Agent => "agent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "lead" => Some(MessageAuthor::Lead),
            "agent" => Some(MessageAuthor::Agent),
            _ => None,
        }
    }
}

/// One entry of a lead's conversation. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub author: MessageAuthor,
    /// `None` when the contact wrote it.
    pub agent_id: Option<Uuid>,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn from_contact(lead_id: Uuid, body: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            author: MessageAuthor::Lead,
            agent_id: None,
            body: body.to_string(),
            created_at: at,
        }
    }

    pub fn from_agent(lead_id: Uuid, agent_id: Uuid, body: &str, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            lead_id,
            author: MessageAuthor::Agent,
            agent_id: Some(agent_id),
            body: body.to_string(),
            created_at: at,
        }
    }
}
