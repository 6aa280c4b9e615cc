//! Fetch window planning.
//!
//! Decides which months of a report still need to be fetched. The latest month
//! that can be requested is always the month before the current one: usage for
//! the running month is not complete yet.

use std::collections::BTreeSet;

use crate::error::AppError;
use crate::models::YearMonth;

/// The latest month that may be harvested when `current` is the running month.
pub fn ceiling(current: YearMonth) -> YearMonth {
    current.pred()
}

/// All months from `start` through `end` (inclusive), clamped to the ceiling.
///
/// Returns an empty vector when `start` lies after the ceiling or after `end`.
pub fn year_months(start: YearMonth, end: Option<YearMonth>, current: YearMonth) -> Vec<YearMonth> {
    let ceiling = ceiling(current);
    let end = end.map_or(ceiling, |e| e.min(ceiling));

    let mut months = Vec::new();
    let mut month = start;
    while month <= end {
        months.push(month);
        month = month.succ();
    }
    months
}

/// String entry point for [`year_months`].
///
/// An empty `end` means "up to the ceiling". An empty or malformed `start` is
/// rejected.
///
/// # Examples
///
/// ```
/// use tally_core::window::year_months_from_str;
///
/// let current = "2016-05".parse().unwrap();
/// let months = year_months_from_str("2016-03", "", current).unwrap();
/// let months: Vec<String> = months.iter().map(|m| m.to_string()).collect();
/// assert_eq!(months, vec!["2016-03", "2016-04"]);
/// ```
pub fn year_months_from_str(
    start: &str,
    end: &str,
    current: YearMonth,
) -> Result<Vec<YearMonth>, AppError> {
    let start: YearMonth = start.parse()?;
    let end = match end.trim() {
        "" => None,
        s => Some(s.parse::<YearMonth>()?),
    };
    Ok(year_months(start, end, current))
}

/// Months to fetch for one provider and report type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchWindow {
    months: Vec<YearMonth>,
    skipped: usize,
}

impl FetchWindow {
    /// Plans the window, leaving out months that are already stored.
    pub fn plan(
        start: YearMonth,
        end: Option<YearMonth>,
        current: YearMonth,
        stored: &BTreeSet<YearMonth>,
    ) -> Self {
        let all = year_months(start, end, current);
        let total = all.len();
        let months: Vec<YearMonth> = all.into_iter().filter(|m| !stored.contains(m)).collect();
        Self {
            skipped: total - months.len(),
            months,
        }
    }

    pub fn months(&self) -> &[YearMonth] {
        &self.months
    }

    pub fn len(&self) -> usize {
        self.months.len()
    }

    pub fn is_empty(&self) -> bool {
        self.months.is_empty()
    }

    /// Number of months left out because they are already stored.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl IntoIterator for FetchWindow {
    type Item = YearMonth;
    type IntoIter = std::vec::IntoIter<YearMonth>;

    fn into_iter(self) -> Self::IntoIter {
        self.months.into_iter()
    }
}
