//! Date-range derivation, filtering and metric aggregation.
//!
//! Everything here is pure. The per-person views and the combined dashboard
//! go through the same [`filter_by_range`] so they always agree.

use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::cache::CacheSnapshot;
use crate::record::{Person, SessionRecord};

/// Inclusive at both ends: `start` is 00:00:00 of the first day, `end` is
/// 23:59:59 of the last day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateRange {
    /// Whole days from `first` through `last`.
    pub fn days(first: NaiveDate, last: NaiveDate) -> Self {
        Self {
            start: first.and_time(NaiveTime::default()),
            end: last.and_time(end_of_day()),
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at <= self.end
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()
}

/// 1970-01-01, where unparsable record dates land.
pub fn epoch_date() -> NaiveDate {
    NaiveDate::default()
}

/// Which period a view covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeSelector {
    Day,
    Week,
    #[default]
    Month,
    Year,
    Custom,
}

impl RangeSelector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for RangeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RangeSelector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "today" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown range: {other}")),
        }
    }
}

/// Derive the range for `selector` relative to `today`.
///
/// Weeks start on Monday. `Custom` uses the explicit bounds and falls back
/// to the month range when either is missing.
pub fn range_for(
    selector: RangeSelector,
    explicit_start: Option<NaiveDate>,
    explicit_end: Option<NaiveDate>,
    today: NaiveDate,
) -> DateRange {
    let first = match selector {
        RangeSelector::Day => today,
        RangeSelector::Week => {
            let offset = today.weekday().num_days_from_monday();
            today
                .checked_sub_days(Days::new(u64::from(offset)))
                .unwrap_or(today)
        }
        RangeSelector::Month => today.with_day(1).unwrap_or(today),
        RangeSelector::Year => today.with_ordinal(1).unwrap_or(today),
        RangeSelector::Custom => {
            return match (explicit_start, explicit_end) {
                (Some(start), Some(end)) => DateRange::days(start, end),
                _ => range_for(RangeSelector::Month, None, None, today),
            };
        }
    };
    DateRange::days(first, today)
}

/// First of the current month through today, the default custom bounds.
pub fn default_custom_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (today.with_day(1).unwrap_or(today), today)
}

/// Calendar date of a record. Missing or unparsable components default to
/// 1970, January, 1st; an impossible date becomes 1970-01-01.
pub fn parse_record_date(date: &str) -> NaiveDate {
    let date = date.split('T').next().unwrap_or_default();
    let mut parts = date.split('-').map(|p| p.trim().parse::<i64>().unwrap_or(0));
    let mut component = |default: i64| match parts.next() {
        Some(n) if n != 0 => n,
        _ => default,
    };
    let (y, m, d) = (component(1970), component(1), component(1));

    i32::try_from(y)
        .ok()
        .zip(u32::try_from(m).ok())
        .zip(u32::try_from(d).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .unwrap_or_else(epoch_date)
}

/// Records whose date falls inside `range`, in their original order.
pub fn filter_by_range(collection: &[SessionRecord], range: &DateRange) -> Vec<SessionRecord> {
    collection
        .iter()
        .filter(|r| range.contains(parse_record_date(&r.date).and_time(NaiveTime::default())))
        .cloned()
        .collect()
}

/// Field-wise sums of the five metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct AggregateTotals {
    pub viewers: f64,
    pub likes: f64,
    pub duration: f64,
    pub comments: f64,
    pub revenue: f64,
}

impl AddAssign<&SessionRecord> for AggregateTotals {
    fn add_assign(&mut self, r: &SessionRecord) {
        self.viewers += r.viewers;
        self.likes += r.likes;
        self.duration += r.duration;
        self.comments += r.comments;
        self.revenue += r.revenue;
    }
}

impl Add for AggregateTotals {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            viewers: self.viewers + rhs.viewers,
            likes: self.likes + rhs.likes,
            duration: self.duration + rhs.duration,
            comments: self.comments + rhs.comments,
            revenue: self.revenue + rhs.revenue,
        }
    }
}

/// Empty input gives all-zero totals.
pub fn aggregate<'a>(records: impl IntoIterator<Item = &'a SessionRecord>) -> AggregateTotals {
    records
        .into_iter()
        .fold(AggregateTotals::default(), |mut totals, r| {
            totals += r;
            totals
        })
}

/// One person's records and totals over a range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PersonView {
    pub person: Person,
    pub range: DateRange,
    pub records: Vec<SessionRecord>,
    pub totals: AggregateTotals,
}

pub fn person_view(snapshot: &CacheSnapshot, person: Person, range: DateRange) -> PersonView {
    let records = filter_by_range(snapshot.collection(person), &range);
    let totals = aggregate(&records);
    PersonView {
        person,
        range,
        records,
        totals,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardEntry {
    pub person: Person,
    pub totals: AggregateTotals,
}

/// Totals per visible person over one shared range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub range: DateRange,
    pub entries: Vec<DashboardEntry>,
}

/// Entries follow [`Person::ALL`] order; `visible` only decides membership.
pub fn dashboard(snapshot: &CacheSnapshot, range: DateRange, visible: &[Person]) -> DashboardView {
    let entries = Person::ALL
        .into_iter()
        .filter(|p| visible.contains(p))
        .map(|person| DashboardEntry {
            person,
            totals: aggregate(&filter_by_range(snapshot.collection(person), &range)),
        })
        .collect();
    DashboardView { range, entries }
}
