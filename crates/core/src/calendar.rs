//! Month calendar of due entries
//!
//! Daily modes render a 42-cell grid that starts on the Monday on or before
//! the first of the month. Weekly mode lists the entries due inside the month.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::models::Plan;
use crate::money::Money;
use crate::schedule::{add_days, amount_for_index, date_for_index, index_for_date, monday_start};

pub const GRID_CELLS: i64 = 42;

/// Status flags of one entry relative to a day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EntryStatus {
    pub done: bool,
    pub today: bool,
    pub overdue: bool,
    pub upcoming: bool,
}

impl EntryStatus {
    pub fn classify(plan: &Plan, index: u32, due: NaiveDate, today: NaiveDate) -> Self {
        let done = plan.is_completed(index);
        Self {
            done,
            today: due == today,
            overdue: due < today && !done,
            upcoming: due > today && !done,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CalendarFilter {
    #[default]
    All,
    Done,
    Overdue,
    Upcoming,
}

impl CalendarFilter {
    /// Case-insensitive; anything unrecognised shows all entries
    pub fn from_str(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "done" => CalendarFilter::Done,
            "overdue" => CalendarFilter::Overdue,
            "upcoming" => CalendarFilter::Upcoming,
            _ => CalendarFilter::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CalendarFilter::All => "all",
            CalendarFilter::Done => "done",
            CalendarFilter::Overdue => "overdue",
            CalendarFilter::Upcoming => "upcoming",
        }
    }

    pub fn matches(&self, status: &EntryStatus) -> bool {
        match self {
            CalendarFilter::All => true,
            CalendarFilter::Done => status.done,
            CalendarFilter::Overdue => status.overdue,
            CalendarFilter::Upcoming => status.upcoming,
        }
    }
}

/// A due entry shown on the calendar
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalendarEntry {
    pub index: u32,
    pub date: NaiveDate,
    pub amount: Money,
    pub status: EntryStatus,
    pub visible: bool,
}

/// One day of the daily grid
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarCell {
    pub date: NaiveDate,
    pub in_month: bool,
    /// `None` when no entry is due on this day
    pub entry: Option<CalendarEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "layout", rename_all = "lowercase")]
pub enum CalendarLayout {
    Grid { cells: Vec<CalendarCell> },
    Weekly { entries: Vec<CalendarEntry> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarView {
    pub month_start: NaiveDate,
    pub filter: CalendarFilter,
    pub layout: CalendarLayout,
    /// Entries due inside the month
    pub due_in_month: u32,
    /// Entries inside the month that pass the filter
    pub visible_in_month: u32,
}

impl CalendarView {
    pub fn build(
        plan: &Plan,
        year: i32,
        month: u32,
        today: NaiveDate,
        filter: CalendarFilter,
    ) -> Result<Self> {
        let month_start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| Error::Validation(format!("invalid month {year}-{month:02}")))?;

        let entry_at = |index: u32, date: NaiveDate| {
            let status = EntryStatus::classify(plan, index, date, today);
            CalendarEntry {
                index,
                date,
                amount: amount_for_index(plan, index),
                status,
                visible: filter.matches(&status),
            }
        };

        let (layout, due_in_month, visible_in_month) = if plan.mode().is_weekly() {
            let entries: Vec<CalendarEntry> = (1..=plan.total_days)
                .map(|index| (index, date_for_index(plan, index)))
                .filter(|(_, date)| same_month(*date, month_start))
                .map(|(index, date)| entry_at(index, date))
                .collect();
            let due = entries.len() as u32;
            let visible = entries.iter().filter(|e| e.visible).count() as u32;
            (CalendarLayout::Weekly { entries }, due, visible)
        } else {
            let grid_start = monday_start(month_start);
            let cells: Vec<CalendarCell> = (0..GRID_CELLS)
                .map(|offset| {
                    let date = add_days(grid_start, offset);
                    CalendarCell {
                        date,
                        in_month: same_month(date, month_start),
                        entry: index_for_date(plan, date).map(|index| entry_at(index, date)),
                    }
                })
                .collect();
            let in_month = || {
                cells
                    .iter()
                    .filter(|c| c.in_month)
                    .filter_map(|c| c.entry.as_ref())
            };
            let due = in_month().count() as u32;
            let visible = in_month().filter(|e| e.visible).count() as u32;
            (CalendarLayout::Grid { cells }, due, visible)
        };

        Ok(Self {
            month_start,
            filter,
            layout,
            due_in_month,
            visible_in_month,
        })
    }

    /// Nothing due this month, or a narrowing filter hides every entry
    pub fn is_empty(&self) -> bool {
        self.due_in_month == 0
            || (self.filter != CalendarFilter::All && self.visible_in_month == 0)
    }
}

fn same_month(date: NaiveDate, month_start: NaiveDate) -> bool {
    date.year() == month_start.year() && date.month() == month_start.month()
}

/// Year and month `delta` months away
pub fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let absolute = year * 12 + month as i32 - 1 + delta;
    (absolute.div_euclid(12), absolute.rem_euclid(12) as u32 + 1)
}
