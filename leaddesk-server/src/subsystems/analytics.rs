//! Analytics aggregator. Pure functions over a snapshot of leads.

use chrono::{Datelike, NaiveDate};
use leaddesk_core::models::{Lead, LeadStatus};
use leaddesk_core::store::LeadFilter;
use leaddesk_core::Result;
use serde::Serialize;

use crate::desk::LeadDesk;

/// Buckets in the missed-chat series, oldest week first.
pub const SERIES_WEEKS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyticsReport {
    pub total_leads: u64,
    pub resolved_percentage: u32,
    pub average_response_time: i64,
    pub missed_chat_weekly_series: [u32; SERIES_WEEKS],
}

/// Share of resolved leads as a whole percentage, halves rounded up.
pub fn resolved_percentage(leads: &[Lead]) -> u32 {
    if leads.is_empty() {
        return 0;
    }
    let resolved = leads
        .iter()
        .filter(|l| l.status == LeadStatus::Resolved)
        .count() as u64;
    let total = leads.len() as u64;
    ((200 * resolved + total) / (2 * total)) as u32
}

/// Mean response time in seconds over answered leads, rounded half up.
pub fn average_response_time(leads: &[Lead]) -> i64 {
    let (sum, count) = leads
        .iter()
        .filter(|l| l.response_time_seconds > 0)
        .fold((0i64, 0i64), |(sum, count), l| {
            (sum + l.response_time_seconds, count + 1)
        });
    if count == 0 {
        return 0;
    }
    (2 * sum + count) / (2 * count)
}

/// Week of the year where week 1 ends on the first Saturday.
pub fn week_number(date: NaiveDate) -> u32 {
    let jan1 = NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date);
    let offset = jan1.weekday().num_days_from_sunday();
    (date.ordinal() + offset).div_ceil(7)
}

/// Missed chats per week over the ten weeks ending with `today`'s week.
/// Only leads from `today`'s year are counted.
pub fn missed_chat_weekly_series(leads: &[Lead], today: NaiveDate) -> [u32; SERIES_WEEKS] {
    let mut series = [0u32; SERIES_WEEKS];
    let current_week = i64::from(week_number(today));

    for lead in leads.iter().filter(|l| l.is_missed_chat) {
        let created = lead.created_at.date_naive();
        if created.year() != today.year() {
            continue;
        }
        let diff = current_week - i64::from(week_number(created));
        if (0..SERIES_WEEKS as i64).contains(&diff) {
            series[SERIES_WEEKS - 1 - diff as usize] += 1;
        }
    }
    series
}

pub fn build_report(leads: &[Lead], today: NaiveDate) -> AnalyticsReport {
    AnalyticsReport {
        total_leads: leads.len() as u64,
        resolved_percentage: resolved_percentage(leads),
        average_response_time: average_response_time(leads),
        missed_chat_weekly_series: missed_chat_weekly_series(leads, today),
    }
}

impl LeadDesk {
    /// Desk-wide figures. The missed-chat sweep runs first so the series is current.
    pub async fn analytics(&self) -> Result<AnalyticsReport> {
        self.sweep_missed_chats().await?;
        let leads = self
            .call(self.store().list_leads(&LeadFilter::default()))
            .await?;
        Ok(build_report(&leads, self.now().date_naive()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn lead(status: LeadStatus, response: i64) -> Lead {
        let mut lead = Lead::open("2026-0101".to_string(), Uuid::new_v4(), Utc::now());
        lead.status = status;
        lead.response_time_seconds = response;
        lead
    }

    fn missed_on(y: i32, m: u32, d: u32) -> Lead {
        let created = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        let mut lead = Lead::open("2026-0101".to_string(), Uuid::new_v4(), created);
        lead.is_missed_chat = true;
        lead
    }

    // ========================================================================
    // TEST 1: 4 of 10 resolved is 40%
    // ========================================================================
    #[test]
    fn test_resolved_percentage() {
        let mut leads: Vec<Lead> = (0..4).map(|_| lead(LeadStatus::Resolved, 0)).collect();
        leads.extend((0..6).map(|_| lead(LeadStatus::Unresolved, 0)));
        assert_eq!(resolved_percentage(&leads), 40);
        assert_eq!(resolved_percentage(&[]), 0);
    }

    // ========================================================================
    // TEST 2: percentages round half up
    // ========================================================================
    #[test]
    fn test_resolved_percentage_rounds_half_up() {
        // 1 of 8 = 12.5%
        let mut leads = vec![lead(LeadStatus::Resolved, 0)];
        leads.extend((0..7).map(|_| lead(LeadStatus::Unresolved, 0)));
        assert_eq!(resolved_percentage(&leads), 13);

        // 2 of 3 = 66.67%
        let leads = vec![
            lead(LeadStatus::Resolved, 0),
            lead(LeadStatus::Resolved, 0),
            lead(LeadStatus::Unresolved, 0),
        ];
        assert_eq!(resolved_percentage(&leads), 67);
    }

    // ========================================================================
    // TEST 3: unanswered leads do not drag the average down
    // ========================================================================
    #[test]
    fn test_average_response_time_ignores_unanswered() {
        let leads = vec![
            lead(LeadStatus::Unresolved, 0),
            lead(LeadStatus::Unresolved, 10),
            lead(LeadStatus::Unresolved, 21),
        ];
        assert_eq!(average_response_time(&leads), 16);
        assert_eq!(average_response_time(&[lead(LeadStatus::Unresolved, 0)]), 0);
    }

    // ========================================================================
    // TEST 4: week numbers count from the Sunday-aligned first week
    // ========================================================================
    #[test]
    fn test_week_number() {
        // 2026-01-01 is a Thursday (offset 4): Jan 1..3 are week 1.
        let d = |m, day| NaiveDate::from_ymd_opt(2026, m, day).unwrap();
        assert_eq!(week_number(d(1, 1)), 1);
        assert_eq!(week_number(d(1, 3)), 1);
        assert_eq!(week_number(d(1, 4)), 2);
        assert_eq!(week_number(d(1, 10)), 2);
        assert_eq!(week_number(d(1, 11)), 3);
        assert_eq!(week_number(d(12, 31)), 53);
    }

    // ========================================================================
    // TEST 5: series buckets by week distance, newest last
    // ========================================================================
    #[test]
    fn test_missed_chat_weekly_series() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 18).unwrap();
        let leads = vec![
            missed_on(2026, 3, 16),  // same week
            missed_on(2026, 3, 17),  // same week
            missed_on(2026, 3, 10),  // one week back
            missed_on(2026, 1, 1),   // more than ten weeks back
            missed_on(2025, 3, 18),  // previous year
            lead(LeadStatus::Unresolved, 0),
        ];

        let series = missed_chat_weekly_series(&leads, today);
        assert_eq!(series[9], 2);
        assert_eq!(series[8], 1);
        assert_eq!(series.iter().sum::<u32>(), 3);
    }

    // ========================================================================
    // TEST 6: empty desk
    // ========================================================================
    #[test]
    fn test_build_report_empty() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 18).unwrap();
        let report = build_report(&[], today);
        assert_eq!(report.total_leads, 0);
        assert_eq!(report.resolved_percentage, 0);
        assert_eq!(report.average_response_time, 0);
        assert_eq!(report.missed_chat_weekly_series, [0; SERIES_WEEKS]);
    }
}
