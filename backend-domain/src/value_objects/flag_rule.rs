// Flag rule value object

use serde::{Deserialize, Serialize};

use super::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagRule {
    FrequentAttendanceEditsSameStudent,
    ManyManualPresentChanges,
    ManyPresentChangesBeforeExam,
}

impl FlagRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagRule::FrequentAttendanceEditsSameStudent => "FREQUENT_ATTENDANCE_EDITS_SAME_STUDENT",
            FlagRule::ManyManualPresentChanges => "MANY_MANUAL_PRESENT_CHANGES",
            FlagRule::ManyPresentChangesBeforeExam => "MANY_PRESENT_CHANGES_BEFORE_EXAM",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            FlagRule::FrequentAttendanceEditsSameStudent => Severity::Medium,
            FlagRule::ManyManualPresentChanges => Severity::Medium,
            FlagRule::ManyPresentChangesBeforeExam => Severity::High,
        }
    }
}
