use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::entities::{
    CourseRef,
    CourseSummary,
    ExamContext,
    ExamEvent,
    Flag,
    PairAggregation,
    PairGroup,
    RecommendedFilters,
    StudentRef,
    UserSummary,
    ATTENDANCE_UPDATE,
    EXAM_EVENT_TYPE,
};
use crate::services::GROUP_LIMIT;
use crate::value_objects::FlagRule;

/// Exams are considered up to this many days past `now`.
pub const EXAM_LOOKAHEAD_DAYS: i64 = 30;
pub const EXAM_TITLE_LIMIT: usize = 5;

/// Raw query parameters. Kept as text so malformed values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagQuery {
    pub window_days: Option<String>,
    pub frequent_edits_threshold: Option<String>,
    pub present_changes_threshold: Option<String>,
    pub before_exam_hours: Option<String>,
    pub before_exam_threshold: Option<String>,
}

impl FlagQuery {
    /// Builds a query from raw `key=value` pairs. The first occurrence of a
    /// key wins; unknown keys are ignored.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut query = Self::default();
        for (key, value) in pairs {
            let slot = match key.as_ref() {
                "windowDays" => &mut query.window_days,
                "frequentEditsThreshold" => &mut query.frequent_edits_threshold,
                "presentChangesThreshold" => &mut query.present_changes_threshold,
                "beforeExamHours" => &mut query.before_exam_hours,
                "beforeExamThreshold" => &mut query.before_exam_threshold,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        query
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagParams {
    pub window_days: i64,
    pub frequent_edits_threshold: u64,
    pub present_changes_threshold: u64,
    pub before_exam_hours: i64,
    pub before_exam_threshold: u64,
}

impl Default for FlagParams {
    fn default() -> Self {
        Self {
            window_days: 7,
            frequent_edits_threshold: 6,
            present_changes_threshold: 5,
            before_exam_hours: 48,
            before_exam_threshold: 5,
        }
    }
}

impl FlagParams {
    pub fn from_query(query: &FlagQuery) -> Self {
        let defaults = Self::default();
        Self {
            window_days: clamp_int(query.window_days.as_deref(), 1, 90, defaults.window_days),
            frequent_edits_threshold: clamp_int(
                query.frequent_edits_threshold.as_deref(),
                2,
                100,
                defaults.frequent_edits_threshold as i64,
            ) as u64,
            present_changes_threshold: clamp_int(
                query.present_changes_threshold.as_deref(),
                2,
                100,
                defaults.present_changes_threshold as i64,
            ) as u64,
            before_exam_hours: clamp_int(
                query.before_exam_hours.as_deref(),
                1,
                168,
                defaults.before_exam_hours,
            ),
            before_exam_threshold: clamp_int(
                query.before_exam_threshold.as_deref(),
                2,
                200,
                defaults.before_exam_threshold as i64,
            ) as u64,
        }
    }

    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.window_days)
    }

    /// Range of exam start dates that can contribute a pre-exam window.
    pub fn exam_range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.since(now), now + Duration::days(EXAM_LOOKAHEAD_DAYS))
    }

    pub fn frequent_edits(&self, since: DateTime<Utc>) -> PairAggregation {
        PairAggregation {
            action: ATTENDANCE_UPDATE.to_string(),
            since,
            until: None,
            present_changes_only: false,
            course_id: None,
            min_count: self.frequent_edits_threshold,
            limit: GROUP_LIMIT,
        }
    }

    pub fn present_changes(&self, since: DateTime<Utc>) -> PairAggregation {
        PairAggregation {
            action: ATTENDANCE_UPDATE.to_string(),
            since,
            until: None,
            present_changes_only: true,
            course_id: None,
            min_count: self.present_changes_threshold,
            limit: GROUP_LIMIT,
        }
    }

    pub fn before_exam(&self, window: &ExamWindow) -> PairAggregation {
        PairAggregation {
            action: ATTENDANCE_UPDATE.to_string(),
            since: window.window_start,
            until: Some(window.window_end),
            present_changes_only: true,
            course_id: Some(window.course_id.clone()),
            min_count: self.before_exam_threshold,
            limit: GROUP_LIMIT,
        }
    }
}

/// Missing or non-numeric input yields `default`; anything numeric is
/// truncated toward zero and clamped into `[min, max]`.
pub fn clamp_int(raw: Option<&str>, min: i64, max: i64, default: i64) -> i64 {
    match raw.and_then(parse_int) {
        Some(value) => value.clamp(min, max),
        None => default,
    }
}

fn parse_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    let value = trimmed.parse::<f64>().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.trunc() as i64)
}

/// Merged pre-exam window of one course.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamWindow {
    pub course_id: String,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub titles: Vec<String>,
}

impl ExamWindow {
    pub fn context(&self) -> ExamContext {
        ExamContext {
            course_id: self.course_id.clone(),
            window_start: self.window_start,
            window_end: self.window_end,
            titles: self.titles.iter().take(EXAM_TITLE_LIMIT).cloned().collect(),
        }
    }
}

/// One window `[start - hours, start]` per exam, merged per course into the
/// earliest start and the latest end. Courses keep the order of their first
/// exam.
pub fn merge_exam_windows(events: &[ExamEvent], before_exam_hours: i64) -> Vec<ExamWindow> {
    let mut windows: Vec<ExamWindow> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for event in events {
        if event.event_type != EXAM_EVENT_TYPE {
            continue;
        }
        let Some(course_id) = event.course_id.as_deref().filter(|id| !id.is_empty()) else {
            continue;
        };
        let start = event.start_date - Duration::hours(before_exam_hours);
        let end = event.start_date;
        let title = event.title.trim();

        match index.get(course_id) {
            Some(&position) => {
                let window = &mut windows[position];
                window.window_start = window.window_start.min(start);
                window.window_end = window.window_end.max(end);
                if !title.is_empty() {
                    window.titles.push(title.to_string());
                }
            }
            None => {
                index.insert(course_id.to_string(), windows.len());
                windows.push(ExamWindow {
                    course_id: course_id.to_string(),
                    window_start: start,
                    window_end: end,
                    titles: if title.is_empty() {
                        Vec::new()
                    } else {
                        vec![title.to_string()]
                    },
                });
            }
        }
    }
    windows
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule: FlagRule,
    pub group: PairGroup,
    pub exam_context: Option<ExamContext>,
}

impl RuleMatch {
    pub fn from_groups(rule: FlagRule, groups: Vec<PairGroup>) -> Vec<Self> {
        groups
            .into_iter()
            .map(|group| Self {
                rule,
                group,
                exam_context: None,
            })
            .collect()
    }

    pub fn from_exam_window(window: &ExamWindow, groups: Vec<PairGroup>) -> Vec<Self> {
        let context = window.context();
        groups
            .into_iter()
            .map(|group| Self {
                rule: FlagRule::ManyPresentChangesBeforeExam,
                group,
                exam_context: Some(context.clone()),
            })
            .collect()
    }
}

/// Grouped rows of all three rules for one detector run.
#[derive(Debug, Clone, Default)]
pub struct RuleMatches {
    pub before_exam: Vec<RuleMatch>,
    pub present_changes: Vec<RuleMatch>,
    pub frequent_edits: Vec<RuleMatch>,
}

impl RuleMatches {
    fn iter(&self) -> impl Iterator<Item = &RuleMatch> {
        self.before_exam
            .iter()
            .chain(self.present_changes.iter())
            .chain(self.frequent_edits.iter())
    }

    pub fn len(&self) -> usize {
        self.before_exam.len() + self.present_changes.len() + self.frequent_edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn student_ids(&self) -> Vec<String> {
        self.iter()
            .map(|m| m.group.student_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn course_ids(&self) -> Vec<String> {
        self.iter()
            .map(|m| m.group.course_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Decorates every row and returns the ranked flag list. Before-exam
    /// rows come first, then present changes, then frequent edits, so equal
    /// sort keys keep that order.
    pub fn into_flags(self, users: &[UserSummary], courses: &[CourseSummary]) -> Vec<Flag> {
        let users: HashMap<&str, &UserSummary> =
            users.iter().map(|user| (user.id.as_str(), user)).collect();
        let courses: HashMap<&str, &CourseSummary> =
            courses.iter().map(|course| (course.id.as_str(), course)).collect();

        let mut flags: Vec<Flag> = self
            .before_exam
            .into_iter()
            .chain(self.present_changes)
            .chain(self.frequent_edits)
            .map(|rule_match| build_flag(rule_match, &users, &courses))
            .collect();
        order_flags(&mut flags);
        flags
    }
}

fn build_flag(
    rule_match: RuleMatch,
    users: &HashMap<&str, &UserSummary>,
    courses: &HashMap<&str, &CourseSummary>,
) -> Flag {
    let RuleMatch {
        rule,
        group,
        exam_context,
    } = rule_match;

    let student = users
        .get(group.student_id.as_str())
        .map(|user| StudentRef {
            id: user.id.clone(),
            name: Some(user.name.clone()),
            email: Some(user.email.clone()),
            role: Some(user.role.clone()),
            student_id: user.student_id.clone(),
        })
        .unwrap_or_else(|| StudentRef::bare(&group.student_id));
    let course = courses
        .get(group.course_id.as_str())
        .map(|course| CourseRef {
            id: course.id.clone(),
            name: Some(course.name.clone()),
            code: Some(course.code.clone()),
        })
        .unwrap_or_else(|| CourseRef::bare(&group.course_id));

    Flag {
        id: format!("{}:{}:{}", rule.as_str(), group.student_id, group.course_id),
        rule,
        severity: rule.severity(),
        count: group.count,
        first_seen: group.first_seen,
        last_seen: group.last_seen,
        student,
        course,
        recommended_filters: RecommendedFilters {
            course_id: group.course_id,
            student_id: group.student_id,
            action: ATTENDANCE_UPDATE.to_string(),
            start_date: group.first_seen,
            end_date: group.last_seen,
        },
        exam_context,
    }
}

/// Stable sort: severity rank desc, then count desc.
pub fn order_flags(flags: &mut [Flag]) {
    flags.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| b.count.cmp(&a.count))
    });
}
