use std::fmt::Write as _;

use serde::Serialize;

use crate::engine::{Notice, SyncState};
use crate::filter::{AggregateTotals, DashboardView, DateRange, PersonView};
use crate::record::Person;

/// Envelope printed by the binary in `--json` mode.
#[derive(Debug, Serialize)]
pub struct Report<T: Serialize> {
    pub status: &'static str,
    pub data: T,
    pub metadata: ReportMetadata,
}

#[derive(Debug, Default, Serialize)]
pub struct ReportMetadata {
    pub command: String,
    pub transport: Option<&'static str>,
    pub sync: Vec<PersonSync>,
    pub notices: Vec<Notice>,
    #[serde(serialize_with = "serialize_finite_f64")]
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersonSync {
    pub person: Person,
    pub state: SyncState,
}

/// Serialize f64, clamping non-finite values (NaN, Inf) to 0.0.
fn serialize_finite_f64<S: serde::Serializer>(v: &f64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(if v.is_finite() { *v } else { 0.0 })
}

impl<T: Serialize> Report<T> {
    pub fn success(data: T, metadata: ReportMetadata) -> Self {
        Self {
            status: "success",
            data,
            metadata,
        }
    }

    pub fn error(data: T, metadata: ReportMetadata) -> Self {
        Self {
            status: "error",
            data,
            metadata,
        }
    }

    /// Pretty JSON. A serialization failure still yields a valid error
    /// document.
    pub fn to_json(&self) -> String {
        match serde_json::to_string_pretty(self) {
            Ok(json) => json,
            Err(e) => {
                let escaped = e.to_string().replace('\\', "\\\\").replace('"', "\\\"");
                format!(
                    r#"{{"status":"error","data":"serialization failed: {escaped}","metadata":{{}}}}"#
                )
            }
        }
    }
}

/// Table of one person's sessions in range, followed by totals.
pub fn render_person(view: &PersonView) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} ({})",
        view.person.display_name(),
        render_range(&view.range)
    );
    let _ = writeln!(
        out,
        "{:<10}  {:<5}  {:>8}  {:>8}  {:>8}  {:>8}  {:>10}",
        "date", "time", "viewers", "likes", "minutes", "comments", "revenue"
    );
    if view.records.is_empty() {
        let _ = writeln!(out, "no lives in this period");
    }
    for r in &view.records {
        let _ = writeln!(
            out,
            "{:<10}  {:<5}  {:>8}  {:>8}  {:>8}  {:>8}  {:>10.2}",
            r.date, r.time, r.viewers, r.likes, r.duration, r.comments, r.revenue
        );
    }
    let _ = writeln!(out, "{}", render_totals("total", &view.totals));
    out
}

/// One totals line per visible person.
pub fn render_dashboard(view: &DashboardView) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "dashboard ({})", render_range(&view.range));
    if view.entries.is_empty() {
        let _ = writeln!(out, "no person selected");
    }
    for entry in &view.entries {
        let _ = writeln!(
            out,
            "{}",
            render_totals(entry.person.display_name(), &entry.totals)
        );
    }
    out
}

pub fn render_totals(label: &str, totals: &AggregateTotals) -> String {
    format!(
        "{label}: viewers {} | likes {} | minutes {} | comments {} | revenue {:.2}",
        totals.viewers, totals.likes, totals.duration, totals.comments, totals.revenue
    )
}

fn render_range(range: &DateRange) -> String {
    format!(
        "{} to {}",
        range.start.format("%Y-%m-%d %H:%M:%S"),
        range.end.format("%Y-%m-%d %H:%M:%S")
    )
}
