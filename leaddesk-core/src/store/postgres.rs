use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{
    AgentDirectory, LeadFilter, LeadStore, MessageStore, ReassignmentReport, SettingsStore,
    StoreHealth,
};
use crate::error::{LeadDeskError, Result};
use crate::models::{
    Agent, AgentRole, ChatSettings, Lead, LeadStatus, Message, MessageAuthor, MissedChatTimer,
};

const LEAD_COLUMNS: &str = "id, ticket_id, contact_name, contact_email, contact_phone, \
     is_first_message_shared, is_detail_shared, status, is_missed_chat, \
     response_time_seconds, responded_at, current_assignee, assignee_list, \
     created_at, updated_at, version";

const AGENT_COLUMNS: &str = "id, first_name, last_name, email, phone, role, parent, created_at";

const MESSAGE_COLUMNS: &str = "id, lead_id, author, agent_id, body, created_at";

/// PostgreSQL-backed store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Row types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: String,
    phone: Option<String>,
    role: String,
    parent: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AgentRow> for Agent {
    type Error = LeadDeskError;

    fn try_from(row: AgentRow) -> Result<Self> {
        let role = AgentRole::parse(&row.role)
            .ok_or_else(|| LeadDeskError::Dependency(format!("unknown agent role '{}'", row.role)))?;
        Ok(Agent {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            role,
            parent: row.parent,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LeadRow {
    id: Uuid,
    ticket_id: String,
    contact_name: Option<String>,
    contact_email: Option<String>,
    contact_phone: Option<String>,
    is_first_message_shared: bool,
    is_detail_shared: bool,
    status: String,
    is_missed_chat: bool,
    response_time_seconds: i64,
    responded_at: Option<DateTime<Utc>>,
    current_assignee: Uuid,
    assignee_list: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<LeadRow> for Lead {
    type Error = LeadDeskError;

    fn try_from(row: LeadRow) -> Result<Self> {
        let status = LeadStatus::parse(&row.status)
            .ok_or_else(|| LeadDeskError::Dependency(format!("unknown lead status '{}'", row.status)))?;
        Ok(Lead {
            id: row.id,
            ticket_id: row.ticket_id,
            contact_name: row.contact_name,
            contact_email: row.contact_email,
            contact_phone: row.contact_phone,
            is_first_message_shared: row.is_first_message_shared,
            is_detail_shared: row.is_detail_shared,
            status,
            is_missed_chat: row.is_missed_chat,
            response_time_seconds: row.response_time_seconds,
            responded_at: row.responded_at,
            current_assignee: row.current_assignee,
            assignee_list: row.assignee_list,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    lead_id: Uuid,
    author: String,
    agent_id: Option<Uuid>,
    body: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = LeadDeskError;

    fn try_from(row: MessageRow) -> Result<Self> {
        let author = MessageAuthor::parse(&row.author).ok_or_else(|| {
            LeadDeskError::Dependency(format!("unknown message author '{}'", row.author))
        })?;
        Ok(Message {
            id: row.id,
            lead_id: row.lead_id,
            author,
            agent_id: row.agent_id,
            body: row.body,
            created_at: row.created_at,
        })
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

async fn insert_message_tx(tx: &mut Transaction<'_, Postgres>, message: &Message) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO messages (id, lead_id, author, agent_id, body, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(message.id)
    .bind(message.lead_id)
    .bind(message.author.as_str())
    .bind(message.agent_id)
    .bind(&message.body)
    .bind(message.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================================
// AgentDirectory
// ============================================================================

#[async_trait]
impl AgentDirectory for PgStore {
    async fn find_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn find_owner(&self) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE role = 'owner' LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn find_agent_by_email(&self, email: &str) -> Result<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Agent::try_from).transpose()
    }

    async fn list_agents(&self) -> Result<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(&format!(
            "SELECT {AGENT_COLUMNS} FROM agents ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Agent::try_from).collect()
    }

    async fn count_members(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*)::bigint FROM agents WHERE role = 'member'")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn insert_agent(&self, agent: &Agent) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO agents (id, first_name, last_name, email, phone, role, parent, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(agent.id)
        .bind(&agent.first_name)
        .bind(&agent.last_name)
        .bind(&agent.email)
        .bind(&agent.phone)
        .bind(agent.role.as_str())
        .bind(agent.parent)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(LeadDeskError::Conflict(format!(
                "agent with email {} or role {} already exists",
                agent.email,
                agent.role.as_str()
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_agent(&self, agent: &Agent) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE agents
            SET first_name = $2, last_name = $3, email = $4, phone = $5
            WHERE id = $1
            "#,
        )
        .bind(agent.id)
        .bind(&agent.first_name)
        .bind(&agent.last_name)
        .bind(&agent.email)
        .bind(&agent.phone)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() == 0 => Err(LeadDeskError::AgentNotFound(agent.id)),
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(LeadDeskError::Conflict(format!(
                "agent with email {} already exists",
                agent.email
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_agent_with_reassignment(
        &self,
        removed: Uuid,
        owner: Uuid,
    ) -> Result<ReassignmentReport> {
        let mut tx = self.pool.begin().await?;
        let mut report = ReassignmentReport::default();

        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads \
             WHERE current_assignee = $1 OR $1 = ANY(assignee_list) \
             FOR UPDATE"
        ))
        .bind(removed)
        .fetch_all(&mut *tx)
        .await?;

        let now = Utc::now();
        for row in rows {
            let mut lead = Lead::try_from(row)?;
            if lead.is_assigned_to(removed) {
                report.leads_reassigned += 1;
            }
            if lead.was_worked_by(removed) {
                report.histories_rewritten += 1;
            }
            lead.reassign_from(removed, owner);

            sqlx::query(
                r#"
                UPDATE leads
                SET current_assignee = $2, assignee_list = $3,
                    version = version + 1, updated_at = $4
                WHERE id = $1
                "#,
            )
            .bind(lead.id)
            .bind(lead.current_assignee)
            .bind(&lead.assignee_list)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        let moved = sqlx::query("UPDATE messages SET agent_id = $2 WHERE agent_id = $1")
            .bind(removed)
            .bind(owner)
            .execute(&mut *tx)
            .await?;
        report.messages_reattributed = moved.rows_affected();

        sqlx::query("UPDATE agents SET parent = NULL WHERE parent = $1")
            .bind(removed)
            .execute(&mut *tx)
            .await?;

        let deleted = sqlx::query("DELETE FROM agents WHERE id = $1")
            .bind(removed)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            // dropping `tx` rolls everything back
            return Err(LeadDeskError::AgentNotFound(removed));
        }

        tx.commit().await?;
        Ok(report)
    }
}

// ============================================================================
// LeadStore
// ============================================================================

#[async_trait]
impl LeadStore for PgStore {
    async fn insert_lead(&self, lead: &Lead, first_message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO leads (
                id, ticket_id, contact_name, contact_email, contact_phone,
                is_first_message_shared, is_detail_shared, status, is_missed_chat,
                response_time_seconds, responded_at, current_assignee, assignee_list,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(lead.id)
        .bind(&lead.ticket_id)
        .bind(&lead.contact_name)
        .bind(&lead.contact_email)
        .bind(&lead.contact_phone)
        .bind(lead.is_first_message_shared)
        .bind(lead.is_detail_shared)
        .bind(lead.status.as_str())
        .bind(lead.is_missed_chat)
        .bind(lead.response_time_seconds)
        .bind(lead.responded_at)
        .bind(lead.current_assignee)
        .bind(&lead.assignee_list)
        .bind(lead.created_at)
        .bind(lead.updated_at)
        .bind(lead.version)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(LeadDeskError::DuplicateKey(lead.ticket_id.clone()))
            }
            Err(e) => return Err(e.into()),
        }

        insert_message_tx(&mut tx, first_message).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn find_lead(&self, id: Uuid) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Lead::try_from).transpose()
    }

    async fn find_lead_by_ticket(&self, ticket_id: &str) -> Result<Option<Lead>> {
        let row = sqlx::query_as::<_, LeadRow>(&format!(
            "SELECT {LEAD_COLUMNS} FROM leads WHERE ticket_id = $1"
        ))
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Lead::try_from).transpose()
    }

    async fn ticket_exists(&self, ticket_id: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM leads WHERE ticket_id = $1)")
                .bind(ticket_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn compare_and_swap_lead(
        &self,
        next: &Lead,
        expected_version: i64,
        appended: Option<&Message>,
    ) -> Result<Lead> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, LeadRow>(&format!(
            r#"
            UPDATE leads
            SET contact_name = $3, contact_email = $4, contact_phone = $5,
                is_first_message_shared = $6, is_detail_shared = $7, status = $8,
                is_missed_chat = $9, response_time_seconds = $10, responded_at = $11,
                current_assignee = $12, assignee_list = $13, updated_at = $14,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {LEAD_COLUMNS}
            "#
        ))
        .bind(next.id)
        .bind(expected_version)
        .bind(&next.contact_name)
        .bind(&next.contact_email)
        .bind(&next.contact_phone)
        .bind(next.is_first_message_shared)
        .bind(next.is_detail_shared)
        .bind(next.status.as_str())
        .bind(next.is_missed_chat)
        .bind(next.response_time_seconds)
        .bind(next.responded_at)
        .bind(next.current_assignee)
        .bind(&next.assignee_list)
        .bind(next.updated_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                LeadDeskError::AgentNotFound(next.current_assignee)
            } else {
                e.into()
            }
        })?;

        let Some(row) = row else {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM leads WHERE id = $1)")
                    .bind(next.id)
                    .fetch_one(&mut *tx)
                    .await?;
            return Err(if exists {
                LeadDeskError::StaleVersion {
                    lead: next.id,
                    expected: expected_version,
                }
            } else {
                LeadDeskError::LeadNotFound(next.id.to_string())
            });
        };

        // Share locks keep a concurrent agent delete out until this commits.
        let referenced = next.referenced_agents();
        let present: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM agents WHERE id = ANY($1) FOR SHARE")
                .bind(&referenced)
                .fetch_all(&mut *tx)
                .await?;
        if let Some(missing) = referenced.iter().find(|id| !present.contains(id)) {
            return Err(LeadDeskError::AgentNotFound(*missing));
        }

        if let Some(message) = appended {
            insert_message_tx(&mut tx, message).await.map_err(|e| match (e, message.agent_id) {
                (LeadDeskError::Database(db), Some(agent)) if is_foreign_key_violation(&db) => {
                    LeadDeskError::AgentNotFound(agent)
                }
                (e, _) => e,
            })?;
        }
        tx.commit().await?;
        Lead::try_from(row)
    }

    async fn list_leads(&self, filter: &LeadFilter) -> Result<Vec<Lead>> {
        let rows = sqlx::query_as::<_, LeadRow>(&format!(
            r#"
            SELECT {LEAD_COLUMNS} FROM leads
            WHERE ($1::uuid IS NULL OR $1 = ANY(assignee_list))
              AND ($2::text IS NULL OR status = $2)
            ORDER BY created_at ASC, ticket_id ASC
            "#
        ))
        .bind(filter.worked_by)
        .bind(filter.status.map(LeadStatus::as_str))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Lead::try_from).collect()
    }

    async fn mark_missed_chats(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE leads
            SET is_missed_chat = TRUE, version = version + 1, updated_at = NOW()
            WHERE responded_at IS NULL
              AND is_missed_chat = FALSE
              AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// MessageStore
// ============================================================================

#[async_trait]
impl MessageStore for PgStore {
    async fn append_message(&self, message: &Message) -> Result<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (id, lead_id, author, agent_id, body, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(message.lead_id)
        .bind(message.author.as_str())
        .bind(message.agent_id)
        .bind(&message.body)
        .bind(message.created_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_foreign_key_violation() => {
                Err(LeadDeskError::LeadNotFound(message.lead_id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn conversation(&self, lead_id: Uuid) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE lead_id = $1 ORDER BY created_at ASC, seq ASC"
        ))
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn latest_contact_message(&self, lead_id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages \
             WHERE lead_id = $1 AND author = 'lead' \
             ORDER BY created_at DESC, seq DESC LIMIT 1"
        ))
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Message::try_from).transpose()
    }
}

// ============================================================================
// SettingsStore
// ============================================================================

#[async_trait]
impl SettingsStore for PgStore {
    async fn chat_settings(&self) -> Result<ChatSettings> {
        let row: Option<(i32, i32, i32)> = sqlx::query_as(
            "SELECT missed_chat_hour, missed_chat_minute, missed_chat_second FROM chat_settings WHERE id = 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        let (hour, minute, second) = row.ok_or_else(|| {
            LeadDeskError::Dependency("chat settings are not initialised".to_string())
        })?;
        Ok(ChatSettings {
            missed_chat_timer: MissedChatTimer {
                hour: hour.max(0) as u32,
                minute: minute.max(0) as u32,
                second: second.max(0) as u32,
            },
        })
    }

    async fn save_chat_settings(&self, settings: &ChatSettings) -> Result<()> {
        let timer = settings.missed_chat_timer;
        sqlx::query(
            r#"
            INSERT INTO chat_settings (id, missed_chat_hour, missed_chat_minute, missed_chat_second, updated_at)
            VALUES (1, $1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE
            SET missed_chat_hour = EXCLUDED.missed_chat_hour,
                missed_chat_minute = EXCLUDED.missed_chat_minute,
                missed_chat_second = EXCLUDED.missed_chat_second,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(timer.hour as i32)
        .bind(timer.minute as i32)
        .bind(timer.second as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ensure_default_settings(&self) -> Result<bool> {
        let timer = MissedChatTimer::default();
        let result = sqlx::query(
            r#"
            INSERT INTO chat_settings (id, missed_chat_hour, missed_chat_minute, missed_chat_second, updated_at)
            VALUES (1, $1, $2, $3, NOW())
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(timer.hour as i32)
        .bind(timer.minute as i32)
        .bind(timer.second as i32)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl StoreHealth for PgStore {
    async fn health(&self) -> Result<String> {
        Ok(crate::db::health_check(&self.pool).await?)
    }
}
