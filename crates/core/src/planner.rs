//! Request planning.
//!
//! Upstream servers bound the size of a single search response, so long lookbacks are split into
//! contiguous calendar windows and fetched as separate requests. Encounter-diagnosis lookups are
//! likewise split into fixed-size id chunks.

use crate::constants::{DATE_SEARCH_PARAM, QUERY_DATE_FORMAT};
use crate::{CdsError, CdsResult};
use chrono::{Duration, NaiveDate};
use serde::Serialize;

/// A half-open pair of calendar dates bounding one windowed query.
///
/// Adjacent windows share their boundary date: the end of one window is the start of the next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Length of the window in days.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }

    /// The `date=ge…` / `date=le…` query parameters for this window.
    pub fn query_params(&self) -> [(String, String); 2] {
        [
            (
                DATE_SEARCH_PARAM.to_string(),
                format!("ge{}", self.start.format(QUERY_DATE_FORMAT)),
            ),
            (
                DATE_SEARCH_PARAM.to_string(),
                format!("le{}", self.end.format(QUERY_DATE_FORMAT)),
            ),
        ]
    }
}

/// Partition the `lookback_days` ending at `today` into `splits` chronological windows.
///
/// Each window is `lookback_days / splits` days long; the remainder is handed out one extra day
/// at a time to the earliest windows, so the window lengths always sum to `lookback_days`.
///
/// # Arguments
///
/// * `lookback_days` - Total number of days covered.
/// * `splits` - Number of windows to produce.
/// * `today` - The date the lookback ends on.
///
/// # Errors
///
/// Returns [`CdsError::InvalidInput`] if `splits` is zero, `lookback_days` is negative, or the
/// lookback reaches outside the representable date range.
pub fn plan_windows(
    lookback_days: i64,
    splits: usize,
    today: NaiveDate,
) -> CdsResult<Vec<DateWindow>> {
    if splits == 0 {
        return Err(CdsError::InvalidInput(
            "window splits must be at least 1".into(),
        ));
    }
    if lookback_days < 0 {
        return Err(CdsError::InvalidInput(format!(
            "lookback must not be negative, got {lookback_days}"
        )));
    }

    let splits_i = splits as i64;
    let base = lookback_days / splits_i;
    let extra = lookback_days % splits_i;

    let out_of_range =
        || CdsError::InvalidInput(format!("lookback of {lookback_days} days is out of range"));

    let mut start = Duration::try_days(lookback_days)
        .and_then(|lookback| today.checked_sub_signed(lookback))
        .ok_or_else(out_of_range)?;
    let mut windows = Vec::with_capacity(splits);
    for i in 0..splits_i {
        let step = if i < extra { base + 1 } else { base };
        let end = Duration::try_days(step)
            .and_then(|step| start.checked_add_signed(step))
            .ok_or_else(out_of_range)?;
        windows.push(DateWindow { start, end });
        start = end;
    }

    Ok(windows)
}

/// Split `ids` into comma-joined groups of at most `size` ids.
///
/// Empty input yields no groups.
pub fn chunk_ids(ids: &[String], size: usize) -> Vec<String> {
    ids.chunks(size.max(1)).map(|chunk| chunk.join(",")).collect()
}
