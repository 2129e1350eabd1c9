//! SLA evaluator: first-response capture and the missed-chat sweep.

use chrono::{DateTime, Utc};
use leaddesk_core::models::{ChatSettings, Lead, MissedChatTimer};
use leaddesk_core::Result;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::desk::LeadDesk;

/// Outcome of one missed-chat sweep.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SweepReport {
    pub flagged: u64,
    pub threshold_seconds: i64,
    /// Leads created before this instant were eligible. `None` when nothing ran.
    pub cutoff: Option<DateTime<Utc>>,
    /// Settings could not be read, so nothing was evaluated.
    pub skipped: bool,
}

impl SweepReport {
    fn idle(threshold_seconds: i64, skipped: bool) -> Self {
        Self {
            flagged: 0,
            threshold_seconds,
            cutoff: None,
            skipped,
        }
    }
}

/// Records the first agent reply at `at`. Returns false if the lead had
/// already been answered, in which case nothing changes.
///
/// Latency is floored to whole seconds. A reply arriving strictly later than
/// the threshold flags the lead, using the same predicate as the sweep.
pub fn capture_first_response(lead: &mut Lead, at: DateTime<Utc>, timer: &MissedChatTimer) -> bool {
    if lead.responded_at.is_some() {
        return false;
    }

    let latency = at - lead.created_at;
    lead.response_time_seconds = latency.num_seconds().max(0);
    lead.responded_at = Some(at);

    if let Some(threshold) = timer.threshold() {
        if latency > threshold {
            lead.is_missed_chat = true;
        }
    }
    true
}

impl LeadDesk {
    pub async fn chat_settings(&self) -> Result<ChatSettings> {
        self.call(self.store().chat_settings()).await
    }

    /// Owner only. Minutes and seconds must be below 60.
    pub async fn update_chat_settings(
        &self,
        agent_id: Uuid,
        timer: MissedChatTimer,
    ) -> Result<ChatSettings> {
        self.require_owner_caller(agent_id, "change chat settings").await?;
        timer.validate()?;

        let settings = ChatSettings {
            missed_chat_timer: timer,
        };
        self.call(self.store().save_chat_settings(&settings)).await?;
        tracing::info!(
            threshold_seconds = timer.total_seconds(),
            "Missed-chat timer updated"
        );
        Ok(settings)
    }

    pub async fn sweep_missed_chats(&self) -> Result<SweepReport> {
        self.sweep_missed_chats_at(self.now()).await
    }

    /// Flags every unanswered lead older than the configured threshold at `now`.
    pub async fn sweep_missed_chats_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let settings = match self.call(self.store().chat_settings()).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "Missed-chat sweep skipped: settings unavailable");
                return Ok(SweepReport::idle(0, true));
            }
        };

        let timer = settings.missed_chat_timer;
        let Some(threshold) = timer.threshold() else {
            tracing::debug!("Missed-chat sweep disabled: zero threshold");
            return Ok(SweepReport::idle(0, false));
        };

        let cutoff = now - threshold;
        let flagged = self.call(self.store().mark_missed_chats(cutoff)).await?;
        if flagged > 0 {
            tracing::info!(flagged, %cutoff, "Leads flagged as missed chats");
        }

        Ok(SweepReport {
            flagged,
            threshold_seconds: timer.total_seconds(),
            cutoff: Some(cutoff),
            skipped: false,
        })
    }

    /// Owner-triggered sweep.
    pub async fn sweep_missed_chats_for(&self, agent_id: Uuid) -> Result<SweepReport> {
        self.require_owner_caller(agent_id, "run the missed-chat sweep")
            .await?;
        self.sweep_missed_chats().await
    }
}

/// Periodic sweep. Returns immediately when `interval_seconds` is 0.
pub async fn run_sweep_loop(
    desk: LeadDesk,
    interval_seconds: u64,
    mut shutdown: broadcast::Receiver<()>,
) {
    if interval_seconds == 0 {
        tracing::info!("Missed-chat sweep loop disabled");
        return;
    }

    let interval = tokio::time::Duration::from_secs(interval_seconds);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("Missed-chat sweep loop started (interval: {}s)", interval_seconds);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match desk.sweep_missed_chats().await {
                    Ok(report) if report.skipped => {}
                    Ok(report) => tracing::debug!(flagged = report.flagged, "Sweep cycle complete"),
                    Err(e) => tracing::error!("Missed-chat sweep error: {}", e),
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Missed-chat sweep loop shutting down");
                break;
            }
        }
    }
}
