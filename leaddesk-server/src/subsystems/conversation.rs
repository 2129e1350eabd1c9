//! Conversation reads for agents.

use chrono::{DateTime, Utc};
use leaddesk_core::models::{Message, MessageAuthor};
use leaddesk_core::{LeadDeskError, Result, Session};
use serde::Serialize;
use uuid::Uuid;

use super::registry::agent_names;
use crate::desk::LeadDesk;

/// Sender label for contact-authored messages.
pub const CONTACT_SENDER: &str = "Lead";

#[derive(Debug, Clone, Serialize)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub author: MessageAuthor,
    pub agent_id: Option<Uuid>,
    pub sender_name: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketConversation {
    pub lead_id: Uuid,
    pub ticket_id: String,
    pub messages: Vec<ConversationEntry>,
}

impl LeadDesk {
    /// Every message of a lead, oldest first.
    pub async fn conversation(&self, lead_id: Uuid) -> Result<Vec<Message>> {
        self.load_lead(lead_id).await?;
        self.call(self.store().conversation(lead_id)).await
    }

    /// The conversation behind `ticket_id` with sender names resolved.
    /// Members only see tickets they have held.
    pub async fn ticket_conversation(
        &self,
        session: &Session,
        ticket_id: &str,
    ) -> Result<TicketConversation> {
        let lead = self.lead_by_ticket(ticket_id).await?;
        if !session.is_owner() && !lead.was_worked_by(session.agent_id) {
            return Err(LeadDeskError::forbidden(format!(
                "ticket {ticket_id} was never assigned to you"
            )));
        }

        let messages = self.call(self.store().conversation(lead.id)).await?;
        let agents = self.call(self.store().list_agents()).await?;
        let names = agent_names(&agents);

        let messages = messages
            .into_iter()
            .map(|m| {
                let sender_name = match (m.author, m.agent_id) {
                    (MessageAuthor::Lead, _) => CONTACT_SENDER.to_string(),
                    (MessageAuthor::Agent, Some(id)) => names
                        .get(&id)
                        .cloned()
                        .unwrap_or_else(|| "N/A".to_string()),
                    (MessageAuthor::Agent, None) => "N/A".to_string(),
                };
                ConversationEntry {
                    id: m.id,
                    author: m.author,
                    agent_id: m.agent_id,
                    sender_name,
                    body: m.body,
                    created_at: m.created_at,
                }
            })
            .collect();

        Ok(TicketConversation {
            lead_id: lead.id,
            ticket_id: lead.ticket_id,
            messages,
        })
    }
}
