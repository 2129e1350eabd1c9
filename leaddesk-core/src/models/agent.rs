use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{LeadDeskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Owner,
    Member,
}

impl AgentRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AgentRole::Owner => "owner",
            AgentRole::Member => "member",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "owner" | "admin" => Some(AgentRole::Owner),
            "member" => Some(AgentRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub role: AgentRole,
    /// Owner at the time this agent was created. Provenance only.
    pub parent: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Agent {
    pub fn is_owner(&self) -> bool {
        self.role == AgentRole::Owner
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// Unvalidated agent registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl NewAgent {
    /// Trims every field, lowercases the email and rejects blanks.
    pub fn normalized(&self) -> Result<NewAgent> {
        let first_name = self.first_name.trim();
        let last_name = self.last_name.trim();
        let email = self.email.trim().to_ascii_lowercase();
        if first_name.is_empty() || last_name.is_empty() {
            return Err(LeadDeskError::validation("first_name and last_name are required"));
        }
        if email.is_empty() || !email.contains('@') {
            return Err(LeadDeskError::validation("a valid email is required"));
        }
        let phone = self
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string);

        Ok(NewAgent {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email,
            phone,
        })
    }

    pub fn into_agent(self, role: AgentRole, parent: Option<Uuid>, now: DateTime<Utc>) -> Agent {
        Agent {
            id: Uuid::new_v4(),
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            role,
            parent,
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(first: &str, last: &str, email: &str) -> NewAgent {
        NewAgent {
            first_name: first.to_string(),
            last_name: last.to_string(),
            email: email.to_string(),
            phone: Some("  ".to_string()),
        }
    }

    #[test]
    fn test_normalized_trims_and_lowercases() {
        let agent = draft("  Ada ", "Lovelace", " Ada@Example.COM ").normalized().unwrap();
        assert_eq!(agent.first_name, "Ada");
        assert_eq!(agent.email, "ada@example.com");
        assert_eq!(agent.phone, None);
    }

    #[test]
    fn test_normalized_rejects_blank_names() {
        let err = draft(" ", "Lovelace", "ada@example.com").normalized().unwrap_err();
        assert!(matches!(err, LeadDeskError::Validation(_)));
    }

    #[test]
    fn test_role_parse_accepts_legacy_admin() {
        assert_eq!(AgentRole::parse("Admin"), Some(AgentRole::Owner));
        assert_eq!(AgentRole::parse("member"), Some(AgentRole::Member));
        assert_eq!(AgentRole::parse("guest"), None);
    }
}
