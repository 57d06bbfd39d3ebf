use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tracked person. Each one owns a separate collection locally and a
/// separate sheet on the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Person {
    Oumiya,
    Abdoulaye,
}

impl Person {
    pub const ALL: [Person; 2] = [Person::Oumiya, Person::Abdoulaye];

    /// Key used in the local cache and in the view.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Oumiya => "oumiya",
            Self::Abdoulaye => "abdoulaye",
        }
    }

    /// Upper-case tag naming the backing sheet on the remote store.
    pub fn remote_tag(&self) -> &'static str {
        match self {
            Self::Oumiya => "OUMIYA",
            Self::Abdoulaye => "ABDOULAYE",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Oumiya => "Oumiya",
            Self::Abdoulaye => "Abdoulaye",
        }
    }
}

impl fmt::Display for Person {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Person {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "oumiya" => Ok(Self::Oumiya),
            "abdoulaye" => Ok(Self::Abdoulaye),
            other => Err(format!("unknown person: {other}")),
        }
    }
}

/// One observed live session. Every field is always populated once a value
/// has gone through [`sanitize`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub time: String,
    pub viewers: f64,
    pub likes: f64,
    /// Minutes.
    pub duration: f64,
    pub comments: f64,
    pub revenue: f64,
}

impl SessionRecord {
    /// Concatenation of date and time. Both are zero-padded, so byte order
    /// is chronological order.
    pub fn sort_key(&self) -> String {
        format!("{}{}", self.date, self.time)
    }

    /// Wire parameters for the remote `add` action, in field order.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("date", self.date.clone()),
            ("time", self.time.clone()),
            ("viewers", self.viewers.to_string()),
            ("likes", self.likes.to_string()),
            ("duration", self.duration.to_string()),
            ("comments", self.comments.to_string()),
            ("revenue", self.revenue.to_string()),
        ]
    }
}

/// Normalize an arbitrary JSON value into a [`SessionRecord`].
///
/// Total: never fails. Numeric fields fall back to 0 for missing, null,
/// non-numeric, non-finite or negative input. `date` and `time` fall back
/// to the empty string.
pub fn sanitize(raw: &Value) -> SessionRecord {
    SessionRecord {
        date: coerce_text(raw.get("date")),
        time: coerce_text(raw.get("time")),
        viewers: coerce_number(raw.get("viewers")),
        likes: coerce_number(raw.get("likes")),
        duration: coerce_number(raw.get("duration")),
        comments: coerce_number(raw.get("comments")),
        revenue: coerce_number(raw.get("revenue")),
    }
}

impl From<&Value> for SessionRecord {
    fn from(raw: &Value) -> Self {
        sanitize(raw)
    }
}

fn coerce_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => String::new(),
    }
}

fn coerce_number(value: Option<&Value>) -> f64 {
    let n = match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => parse_decimal(s),
        Some(Value::Bool(true)) => 1.0,
        _ => 0.0,
    };
    if n.is_finite() && n > 0.0 { n } else { 0.0 }
}

/// Plain decimal parse. Rejects the spellings `f64::from_str` accepts but a
/// form field never should ("inf", "NaN").
fn parse_decimal(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty()
        || !trimmed
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
    {
        return 0.0;
    }
    trimmed.parse::<f64>().unwrap_or(0.0)
}

/// Re-establish canonical order. Stable, so equal keys keep arrival order.
pub fn sort_records(records: &mut [SessionRecord]) {
    records.sort_by_key(SessionRecord::sort_key);
}
