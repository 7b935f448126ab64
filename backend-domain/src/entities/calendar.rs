// Calendar event entity (owned by the calendar service, read-only here)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const EXAM_EVENT_TYPE: &str = "exam";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamEvent {
    pub event_type: String,
    pub course_id: Option<String>,
    pub start_date: DateTime<Utc>,
    pub title: String,
}
