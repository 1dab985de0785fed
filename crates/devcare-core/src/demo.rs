//! Demo session generator.
//!
//! Fills a date range with plausible work days so the statistics have
//! something to show. Each day runs from 08:00 to 17:00 UTC, alternating a
//! random work block with a random break; the day ends as soon as the next
//! block would run past 17:00.

use chrono::{Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::prelude::*;
use rand_pcg::Mcg128Xsl64;

use crate::error::ValidationError;
use crate::storage::{NewSession, SessionKind};

pub const WORK_DURATIONS: [u64; 4] = [25, 30, 45, 60];
pub const BREAK_DURATIONS: [u64; 4] = [5, 10, 15, 20];

const DAY_START_HOUR: u32 = 8;
const DAY_END_HOUR: u32 = 17;

/// Seeded generator, or one seeded from entropy.
pub fn rng(seed: Option<u64>) -> Mcg128Xsl64 {
    match seed {
        Some(seed) => Mcg128Xsl64::seed_from_u64(seed),
        None => Mcg128Xsl64::from_entropy(),
    }
}

/// Generate sessions for every day in `from..=to`.
///
/// # Errors
/// `InvalidDateRange` when `to` is before `from`.
pub fn generate_sessions<R: Rng + ?Sized>(
    rng: &mut R,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<NewSession>, ValidationError> {
    if to < from {
        return Err(ValidationError::InvalidDateRange { from, to });
    }

    let mut sessions = Vec::new();
    for date in from.iter_days().take_while(|d| *d <= to) {
        generate_day(rng, date, &mut sessions);
    }
    tracing::debug!(count = sessions.len(), %from, %to, "demo sessions generated");
    Ok(sessions)
}

fn generate_day<R: Rng + ?Sized>(rng: &mut R, date: NaiveDate, out: &mut Vec<NewSession>) {
    let at = |hour| {
        NaiveTime::from_hms_opt(hour, 0, 0).map(|t| Utc.from_utc_datetime(&date.and_time(t)))
    };
    let (Some(mut current), Some(day_end)) = (at(DAY_START_HOUR), at(DAY_END_HOUR)) else {
        return;
    };

    let mut kind = SessionKind::Work;
    loop {
        let choices = match kind {
            SessionKind::Work => &WORK_DURATIONS,
            SessionKind::Break => &BREAK_DURATIONS,
        };
        let Some(&duration_min) = choices.choose(rng) else {
            return;
        };
        let end = current + Duration::minutes(duration_min as i64);
        if end > day_end {
            return;
        }
        out.push(NewSession {
            start_time: current,
            end_time: end,
            duration_min,
            kind,
            task_id: None,
        });
        current = end;
        kind = match kind {
            SessionKind::Work => SessionKind::Break,
            SessionKind::Break => SessionKind::Work,
        };
    }
}
