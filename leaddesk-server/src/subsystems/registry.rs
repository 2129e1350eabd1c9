//! Lead registry
//!
//! Owns lead lifecycle: creation from the first contact message, the contact
//! form, conversation appends, status changes and the per-agent listing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use leaddesk_core::models::{
    Agent, ContactDetails, Lead, LeadStatus, Message, MessageAuthor, MissedChatTimer,
};
use leaddesk_core::store::LeadFilter;
use leaddesk_core::{LeadDeskError, Result, Session};
use serde::Serialize;
use uuid::Uuid;

use super::sla::capture_first_response;
use crate::desk::LeadDesk;

/// Shown in listings for leads with no contact-authored message.
pub const NO_MESSAGE: &str = "No message";

const UNKNOWN_AGENT: &str = "Unknown agent";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AssigneeRef {
    pub agent_id: Uuid,
    pub name: String,
}

/// One row of an agent's lead listing.
#[derive(Debug, Clone, Serialize)]
pub struct LeadSummary {
    pub lead_id: Uuid,
    pub ticket_id: String,
    pub latest_message: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub status: LeadStatus,
    pub is_missed_chat: bool,
    pub response_time_seconds: i64,
    pub is_current_assignee: bool,
    pub assignee: AssigneeRef,
    pub assignee_history: Vec<AssigneeRef>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub id: Uuid,
    pub author: MessageAuthor,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// What the contact's chat widget may see of its own lead.
#[derive(Debug, Clone, Serialize)]
pub struct ContactView {
    pub lead_id: Uuid,
    pub ticket_id: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub is_first_message_shared: bool,
    pub is_detail_shared: bool,
    pub status: LeadStatus,
    pub conversation: Vec<ContactMessage>,
}

/// Result of an agent reply.
#[derive(Debug, Clone, Serialize)]
pub struct AgentReply {
    pub lead: Lead,
    pub message: Message,
    /// True when this reply was the lead's first agent response.
    pub first_response: bool,
}

fn require_text(text: &str, field: &str) -> Result<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(LeadDeskError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

/// Trims the contact form and rejects blank fields.
pub fn normalize_contact_details(name: &str, email: &str, phone: &str) -> Result<ContactDetails> {
    Ok(ContactDetails {
        name: require_text(name, "name")?,
        email: require_text(email, "email")?,
        phone: require_text(phone, "phone")?,
    })
}

pub(crate) fn agent_names(agents: &[Agent]) -> HashMap<Uuid, String> {
    agents.iter().map(|a| (a.id, a.display_name())).collect()
}

pub(crate) fn assignee_ref(names: &HashMap<Uuid, String>, agent_id: Uuid) -> AssigneeRef {
    AssigneeRef {
        agent_id,
        name: names
            .get(&agent_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_AGENT.to_string()),
    }
}

impl LeadDesk {
    /// Opens a lead for a first contact message. The owner holds it initially.
    pub async fn create_lead(&self, initial_message: &str) -> Result<Lead> {
        let body = require_text(initial_message, "message")?;
        let owner = self.require_owner().await?;
        let now = self.now();

        let lead = self
            .insert_with_fresh_ticket(now.date_naive(), |ticket_id| {
                let lead = Lead::open(ticket_id, owner.id, now);
                let first = Message::from_contact(lead.id, &body, now);
                (lead, first)
            })
            .await?;

        tracing::info!(lead_id = %lead.id, ticket_id = %lead.ticket_id, "Lead created");
        Ok(lead)
    }

    /// Stores the contact form. Submitting identical values again is a no-op.
    pub async fn submit_contact_details(
        &self,
        lead_id: Uuid,
        name: &str,
        email: &str,
        phone: &str,
    ) -> Result<Lead> {
        let details = normalize_contact_details(name, email, phone)?;

        let lead = self
            .update_lead(lead_id, None, |lead| {
                let unchanged = lead.is_detail_shared
                    && lead.contact_name.as_deref() == Some(details.name.as_str())
                    && lead.contact_email.as_deref() == Some(details.email.as_str())
                    && lead.contact_phone.as_deref() == Some(details.phone.as_str());
                if unchanged {
                    return Ok(false);
                }
                lead.contact_name = Some(details.name.clone());
                lead.contact_email = Some(details.email.clone());
                lead.contact_phone = Some(details.phone.clone());
                lead.is_detail_shared = true;
                Ok(true)
            })
            .await?;

        tracing::debug!(%lead_id, version = lead.version, "Contact details stored");
        Ok(lead)
    }

    pub async fn append_contact_message(&self, lead_id: Uuid, text: &str) -> Result<Message> {
        let body = require_text(text, "message")?;
        self.load_lead(lead_id).await?;

        let message = Message::from_contact(lead_id, &body, self.now());
        self.call(self.store().append_message(&message)).await?;
        Ok(message)
    }

    /// Agent reply. Only the current assignee may write; the first reply also
    /// fixes the lead's response time, in the same commit as the message.
    pub async fn append_agent_message(
        &self,
        lead_id: Uuid,
        agent_id: Uuid,
        text: &str,
    ) -> Result<AgentReply> {
        let body = require_text(text, "message")?;
        let timer = self.effective_timer().await;
        let message = Message::from_agent(lead_id, agent_id, &body, self.now());

        let mut first_response = false;
        let lead = self
            .update_lead(lead_id, Some(&message), |lead| {
                if !lead.is_assigned_to(agent_id) {
                    return Err(LeadDeskError::NotCurrentAssignee {
                        lead: lead_id,
                        agent: agent_id,
                    });
                }
                first_response = capture_first_response(lead, message.created_at, &timer);
                Ok(true)
            })
            .await?;

        if first_response {
            tracing::info!(
                %lead_id,
                response_time_seconds = lead.response_time_seconds,
                missed = lead.is_missed_chat,
                "First response recorded"
            );
        }

        Ok(AgentReply {
            lead,
            message,
            first_response,
        })
    }

    /// Current assignee only.
    pub async fn update_status(
        &self,
        lead_id: Uuid,
        agent_id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead> {
        let lead = self
            .update_lead(lead_id, None, |lead| {
                if !lead.is_assigned_to(agent_id) {
                    return Err(LeadDeskError::NotCurrentAssignee {
                        lead: lead_id,
                        agent: agent_id,
                    });
                }
                if lead.status == status {
                    return Ok(false);
                }
                lead.status = status;
                Ok(true)
            })
            .await?;

        tracing::info!(%lead_id, status = status.as_str(), "Lead status updated");
        Ok(lead)
    }

    /// The caller's leads, oldest first. Owners see everything; members see
    /// leads they have ever held. Runs the missed-chat sweep first.
    pub async fn list_for_agent(
        &self,
        session: &Session,
        status: Option<LeadStatus>,
    ) -> Result<Vec<LeadSummary>> {
        self.sweep_missed_chats().await?;

        let filter = LeadFilter {
            worked_by: (!session.is_owner()).then_some(session.agent_id),
            status,
        };
        let leads = self.call(self.store().list_leads(&filter)).await?;
        let agents = self.call(self.store().list_agents()).await?;
        let names = agent_names(&agents);

        let mut summaries = Vec::with_capacity(leads.len());
        for lead in leads {
            let latest = self
                .call(self.store().latest_contact_message(lead.id))
                .await?
                .map(|m| m.body)
                .unwrap_or_else(|| NO_MESSAGE.to_string());

            summaries.push(LeadSummary {
                lead_id: lead.id,
                ticket_id: lead.ticket_id.clone(),
                latest_message: latest,
                contact_name: lead.contact_name.clone(),
                contact_email: lead.contact_email.clone(),
                contact_phone: lead.contact_phone.clone(),
                status: lead.status,
                is_missed_chat: lead.is_missed_chat,
                response_time_seconds: lead.response_time_seconds,
                is_current_assignee: lead.is_assigned_to(session.agent_id),
                assignee: assignee_ref(&names, lead.current_assignee),
                assignee_history: lead
                    .assignee_list
                    .iter()
                    .map(|id| assignee_ref(&names, *id))
                    .collect(),
                created_at: lead.created_at,
            });
        }
        Ok(summaries)
    }

    pub async fn lead_details(&self, lead_id: Uuid) -> Result<Lead> {
        self.load_lead(lead_id).await
    }

    pub async fn lead_by_ticket(&self, ticket_id: &str) -> Result<Lead> {
        self.call(self.store().find_lead_by_ticket(ticket_id))
            .await?
            .ok_or_else(|| LeadDeskError::LeadNotFound(ticket_id.to_string()))
    }

    pub async fn contact_view(&self, lead_id: Uuid) -> Result<ContactView> {
        let lead = self.load_lead(lead_id).await?;
        let conversation = self.call(self.store().conversation(lead_id)).await?;

        Ok(ContactView {
            lead_id: lead.id,
            ticket_id: lead.ticket_id,
            contact_name: lead.contact_name,
            contact_email: lead.contact_email,
            contact_phone: lead.contact_phone,
            is_first_message_shared: lead.is_first_message_shared,
            is_detail_shared: lead.is_detail_shared,
            status: lead.status,
            conversation: conversation
                .into_iter()
                .map(|m| ContactMessage {
                    id: m.id,
                    author: m.author,
                    body: m.body,
                    created_at: m.created_at,
                })
                .collect(),
        })
    }

    /// Timer used for late-reply detection. Without settings nothing is late.
    async fn effective_timer(&self) -> MissedChatTimer {
        match self.call(self.store().chat_settings()).await {
            Ok(settings) => settings.missed_chat_timer,
            Err(e) => {
                tracing::warn!(error = %e, "Chat settings unavailable, late replies will not be flagged");
                MissedChatTimer {
                    hour: 0,
                    minute: 0,
                    second: 0,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contact_details_are_trimmed() {
        let details = normalize_contact_details(" Ana ", "ana@example.com ", " 555 ").unwrap();
        assert_eq!(details.name, "Ana");
        assert_eq!(details.email, "ana@example.com");
        assert_eq!(details.phone, "555");
    }

    #[test]
    fn test_contact_details_require_every_field() {
        let err = normalize_contact_details("Ana", "  ", "555").unwrap_err();
        assert!(matches!(err, LeadDeskError::Validation(_)));
    }

    #[test]
    fn test_assignee_ref_falls_back_for_unknown_agents() {
        let names = HashMap::new();
        let r = assignee_ref(&names, Uuid::new_v4());
        assert_eq!(r.name, UNKNOWN_AGENT);
    }
}
