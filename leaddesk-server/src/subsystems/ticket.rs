//! Ticket identity generation
//!
//! Ids are the UTC calendar date (`YYYY-MMDD`), suffixed `-01`, `-02`, ...
//! once the bare date is taken. The store's unique constraint has the final
//! say; `ticket_exists` is only used to skip known-taken candidates quickly.

use std::sync::OnceLock;

use chrono::NaiveDate;
use leaddesk_core::models::{Lead, Message};
use leaddesk_core::{LeadDeskError, Result};
use regex::Regex;

use crate::desk::LeadDesk;

/// Candidates tried per allocation before giving up with `Conflict`.
pub const MAX_TICKET_ATTEMPTS: u32 = 100;

const TICKET_PATTERN: &str = r"^\d{4}-\d{4}(-\d{2,})?$";

pub fn base_ticket_id(date: NaiveDate) -> String {
    date.format("%Y-%m%d").to_string()
}

/// The `n`th candidate for `base`: the base itself, then `base-01`, `base-02`...
pub fn ticket_candidate(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{base}-{n:02}")
    }
}

pub fn is_ticket_id(value: &str) -> bool {
    static TICKET_RE: OnceLock<Option<Regex>> = OnceLock::new();
    TICKET_RE
        .get_or_init(|| Regex::new(TICKET_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(value))
}

impl LeadDesk {
    /// Inserts the lead built for the first free ticket id on `date`.
    ///
    /// `build` is called once per candidate that reaches the store and must
    /// return the lead together with its opening message.
    pub(crate) async fn insert_with_fresh_ticket<F>(&self, date: NaiveDate, mut build: F) -> Result<Lead>
    where
        F: FnMut(String) -> (Lead, Message) + Send,
    {
        let base = base_ticket_id(date);

        for n in 0..MAX_TICKET_ATTEMPTS {
            let candidate = ticket_candidate(&base, n);
            if self.call(self.store().ticket_exists(&candidate)).await? {
                continue;
            }

            let (lead, first_message) = build(candidate);
            match self.call(self.store().insert_lead(&lead, &first_message)).await {
                Ok(()) => {
                    tracing::debug!(ticket_id = %lead.ticket_id, attempts = n + 1, "Ticket allocated");
                    return Ok(lead);
                }
                Err(LeadDeskError::DuplicateKey(taken)) => {
                    tracing::debug!(ticket_id = %taken, "Ticket taken concurrently, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        tracing::warn!(%base, attempts = MAX_TICKET_ATTEMPTS, "Ticket allocation exhausted");
        Err(LeadDeskError::Conflict(format!(
            "no free ticket id for {base} after {MAX_TICKET_ATTEMPTS} attempts"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_ticket_id_is_year_then_month_day() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(base_ticket_id(date), "2026-0302");
        let date = NaiveDate::from_ymd_opt(2025, 12, 31).unwrap();
        assert_eq!(base_ticket_id(date), "2025-1231");
    }

    #[test]
    fn test_candidates_are_zero_padded() {
        assert_eq!(ticket_candidate("2026-0302", 0), "2026-0302");
        assert_eq!(ticket_candidate("2026-0302", 1), "2026-0302-01");
        assert_eq!(ticket_candidate("2026-0302", 12), "2026-0302-12");
        assert_eq!(ticket_candidate("2026-0302", 100), "2026-0302-100");
    }

    #[test]
    fn test_ticket_shape_check() {
        assert!(is_ticket_id("2026-0302"));
        assert!(is_ticket_id("2026-0302-07"));
        assert!(is_ticket_id("2026-0302-107"));
        assert!(!is_ticket_id("2026-0302-7"));
        assert!(!is_ticket_id("26-0302"));
        assert!(!is_ticket_id("2026-0302; DROP TABLE leads"));
        assert!(!is_ticket_id(""));
    }
}
