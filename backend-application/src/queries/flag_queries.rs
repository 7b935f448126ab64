use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::{AppError, AppState};
use backend_domain::{
    merge_exam_windows,
    Flag,
    FlagParams,
    FlagQuery,
    FlagRule,
    RuleMatch,
    RuleMatches,
};

/// Admin flag listing. Inputs are clamped, never rejected; any store
/// failure fails the whole computation.
pub async fn list_flags(state: &AppState, query: FlagQuery) -> Result<Vec<Flag>, AppError> {
    let params = FlagParams::from_query(&query);
    state.metrics.record_flag_request();
    match detect_flags(state, params, Utc::now()).await {
        Ok(flags) => {
            state.metrics.record_flags(flags.len());
            Ok(flags)
        }
        Err(err) => {
            state.metrics.record_flag_error();
            error!("failed to compute audit flags: {:#}", err);
            Err(AppError::Internal(err.context("failed to compute audit flags")))
        }
    }
}

pub async fn detect_flags(
    state: &AppState,
    params: FlagParams,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<Flag>> {
    let since = params.since(now);
    let frequent_query = params.frequent_edits(since);
    let present_query = params.present_changes(since);
    let (frequent_edits, present_changes) = tokio::try_join!(
        state.audit_repo.aggregate_pairs(&frequent_query),
        state.audit_repo.aggregate_pairs(&present_query),
    )?;
    let before_exam = detect_before_exam(state, &params, now).await?;

    let matches = RuleMatches {
        before_exam,
        present_changes: RuleMatch::from_groups(FlagRule::ManyManualPresentChanges, present_changes),
        frequent_edits: RuleMatch::from_groups(
            FlagRule::FrequentAttendanceEditsSameStudent,
            frequent_edits,
        ),
    };
    debug!(
        "flag rules matched: before_exam={} present_changes={} frequent_edits={}",
        matches.before_exam.len(),
        matches.present_changes.len(),
        matches.frequent_edits.len()
    );
    if matches.is_empty() {
        return Ok(Vec::new());
    }

    let student_ids = matches.student_ids();
    let course_ids = matches.course_ids();
    let (users, courses) = tokio::try_join!(
        state.directory_repo.fetch_users(&student_ids),
        state.directory_repo.fetch_courses(&course_ids),
    )?;
    Ok(matches.into_flags(&users, &courses))
}

/// Course windows are queried one at a time.
async fn detect_before_exam(
    state: &AppState,
    params: &FlagParams,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<RuleMatch>> {
    let (from, to) = params.exam_range(now);
    let events = state.calendar_repo.fetch_exam_events(from, to).await?;
    let windows = merge_exam_windows(&events, params.before_exam_hours);

    let mut matches = Vec::new();
    for window in &windows {
        let groups = state
            .audit_repo
            .aggregate_pairs(&params.before_exam(window))
            .await?;
        matches.extend(RuleMatch::from_exam_window(window, groups));
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use anyhow::anyhow;
    use async_trait::async_trait;
    use backend_domain::{
        AuditLogEntry,
        AuditLogRepository,
        CalendarRepository,
        CourseSummary,
        ExamEvent,
        Severity,
        UserSummary,
        ATTENDANCE_UPDATE,
        EXAM_EVENT_TYPE,
    };
    use backend_infrastructure::MemoryRepo;
    use chrono::{Duration, TimeZone};
    use serde_json::Map;

    use crate::test_support::memory_state;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 14, 10, 0, 0).unwrap()
    }

    fn correction(student: &str, course: &str, at: DateTime<Utc>, old: &str, new: &str) -> AuditLogEntry {
        AuditLogEntry {
            id: format!("{}:{}:{}", student, course, at.timestamp_millis()),
            actor_id: Some("teacher-1".to_string()),
            actor_role: "teacher".to_string(),
            action: ATTENDANCE_UPDATE.to_string(),
            student_id: Some(student.to_string()),
            course_id: Some(course.to_string()),
            old_status: Some(old.to_string()),
            new_status: Some(new.to_string()),
            correction_reason: Some("manual fix".to_string()),
            meta: Map::new(),
            created_at: at,
        }
    }

    fn exam(course: &str, start: DateTime<Utc>, title: &str) -> ExamEvent {
        ExamEvent {
            event_type: EXAM_EVENT_TYPE.to_string(),
            course_id: Some(course.to_string()),
            start_date: start,
            title: title.to_string(),
        }
    }

    async fn seeded(entries: Vec<AuditLogEntry>, exams: Vec<ExamEvent>) -> Arc<MemoryRepo> {
        let repo = Arc::new(MemoryRepo::new());
        repo.insert_entries(&entries).await.expect("insert entries");
        repo.add_exam_events(exams).await;
        repo
    }

    fn assert_ranked(flags: &[Flag]) {
        for pair in flags.windows(2) {
            assert!(pair[0].severity >= pair[1].severity);
            if pair[0].severity == pair[1].severity {
                assert!(pair[0].count >= pair[1].count);
            }
        }
    }

    #[tokio::test]
    async fn empty_log_yields_empty_list() {
        let repo = seeded(Vec::new(), vec![exam("c1", now() + Duration::hours(3), "Final")]).await;
        let flags = detect_flags(&memory_state(repo), FlagParams::default(), now())
            .await
            .expect("detect");
        assert!(flags.is_empty());
    }

    #[tokio::test]
    async fn seven_manual_present_changes_trip_both_medium_rules() {
        let entries: Vec<AuditLogEntry> = (1..=7)
            .map(|day| correction("s1", "c1", now() - Duration::hours(day * 20), "absent", "present"))
            .collect();
        let repo = seeded(entries, Vec::new()).await;

        let flags = detect_flags(&memory_state(repo), FlagParams::default(), now())
            .await
            .expect("detect");
        assert_eq!(flags.len(), 2);
        assert_eq!(flags[0].rule, FlagRule::ManyManualPresentChanges);
        assert_eq!(flags[1].rule, FlagRule::FrequentAttendanceEditsSameStudent);
        for flag in &flags {
            assert_eq!(flag.count, 7);
            assert_eq!(flag.severity, Severity::Medium);
            assert_eq!(flag.first_seen, now() - Duration::hours(140));
            assert_eq!(flag.last_seen, now() - Duration::hours(20));
            assert_eq!(flag.recommended_filters.student_id, "s1");
            assert_eq!(flag.recommended_filters.course_id, "c1");
            assert!(flag.exam_context.is_none());
        }
    }

    #[tokio::test]
    async fn present_changes_inside_pre_exam_window_raise_high_flag() {
        let exam_start = now() + Duration::hours(2);
        let entries: Vec<AuditLogEntry> = (1..=5)
            .map(|i| correction("s1", "c1", exam_start - Duration::hours(i * 8), "absent", "present"))
            .collect();
        let repo = seeded(entries, vec![exam("c1", exam_start, "Midterm")]).await;

        let flags = detect_flags(&memory_state(repo), FlagParams::default(), now())
            .await
            .expect("detect");
        assert_eq!(flags[0].rule, FlagRule::ManyPresentChangesBeforeExam);
        assert_eq!(flags[0].severity, Severity::High);
        assert_eq!(flags[0].count, 5);
        let context = flags[0].exam_context.as_ref().expect("exam context");
        assert_eq!(context.course_id, "c1");
        assert_eq!(context.window_start, exam_start - Duration::hours(48));
        assert_eq!(context.window_end, exam_start);
        assert_eq!(context.titles, vec!["Midterm".to_string()]);
        assert_ranked(&flags);
    }

    #[tokio::test]
    async fn corrections_before_the_pre_exam_window_do_not_count() {
        let exam_start = now() + Duration::hours(2);
        let entries: Vec<AuditLogEntry> = (0..5)
            .map(|i| {
                correction(
                    "s1",
                    "c1",
                    exam_start - Duration::hours(72) - Duration::minutes(i),
                    "absent",
                    "present",
                )
            })
            .collect();
        let repo = seeded(entries, vec![exam("c1", exam_start, "Midterm")]).await;

        let flags = detect_flags(&memory_state(repo), FlagParams::default(), now())
            .await
            .expect("detect");
        assert!(flags
            .iter()
            .all(|flag| flag.rule != FlagRule::ManyPresentChangesBeforeExam));
        assert!(flags
            .iter()
            .any(|flag| flag.rule == FlagRule::ManyManualPresentChanges));
    }

    #[tokio::test]
    async fn exams_outside_lookahead_contribute_nothing() {
        let corrections_before = |exam_start: DateTime<Utc>| -> Vec<AuditLogEntry> {
            (1..=5)
                .map(|i| correction("s1", "c1", exam_start - Duration::hours(i), "absent", "present"))
                .collect()
        };
        let params = FlagParams {
            present_changes_threshold: 100,
            frequent_edits_threshold: 100,
            ..FlagParams::default()
        };

        let near_exam = now() + Duration::days(29);
        let repo = seeded(corrections_before(near_exam), vec![exam("c1", near_exam, "Final")]).await;
        let near = detect_flags(&memory_state(repo), params, now())
            .await
            .expect("detect");
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].rule, FlagRule::ManyPresentChangesBeforeExam);

        let far_exam = now() + Duration::days(31);
        let repo = seeded(corrections_before(far_exam), vec![exam("c1", far_exam, "Final")]).await;
        let far = detect_flags(&memory_state(repo), params, now())
            .await
            .expect("detect");
        assert!(far.is_empty());
    }

    #[tokio::test]
    async fn exams_before_the_window_start_contribute_nothing() {
        let past_exam = now() - Duration::days(2);
        let entries: Vec<AuditLogEntry> = (1..=6)
            .map(|i| correction("s1", "c1", past_exam - Duration::hours(i * 6), "absent", "present"))
            .collect();
        let repo = seeded(entries, vec![exam("c1", past_exam, "Quiz")]).await;
        let state = memory_state(repo);

        let one_day = FlagParams::from_query(&FlagQuery::from_pairs(vec![("windowDays", "1")]));
        let flags = detect_flags(&state, one_day, now()).await.expect("detect");
        assert!(flags.is_empty());

        let one_week = FlagParams::default();
        let flags = detect_flags(&state, one_week, now()).await.expect("detect");
        assert!(flags
            .iter()
            .any(|flag| flag.rule == FlagRule::ManyPresentChangesBeforeExam));
    }

    #[tokio::test]
    async fn pre_exam_query_is_scoped_to_the_exam_course() {
        let exam_start = now() + Duration::hours(1);
        let mut entries: Vec<AuditLogEntry> = (0..5)
            .map(|i| correction("s1", "c2", now() - Duration::hours(i), "absent", "present"))
            .collect();
        entries.push(correction("s1", "c1", now() - Duration::hours(1), "absent", "present"));
        let repo = seeded(entries, vec![exam("c1", exam_start, "Lab exam")]).await;

        let flags = detect_flags(&memory_state(repo), FlagParams::default(), now())
            .await
            .expect("detect");
        assert!(flags
            .iter()
            .all(|flag| flag.rule != FlagRule::ManyPresentChangesBeforeExam));
    }

    #[tokio::test]
    async fn clamped_threshold_never_returns_smaller_groups() {
        let entries = vec![
            correction("lonely", "c1", now() - Duration::hours(1), "present", "absent"),
            correction("pair", "c1", now() - Duration::hours(2), "present", "absent"),
            correction("pair", "c1", now() - Duration::hours(3), "absent", "late"),
        ];
        let repo = seeded(entries, Vec::new()).await;
        let query = FlagQuery {
            frequent_edits_threshold: Some("1".to_string()),
            ..FlagQuery::default()
        };

        let flags = detect_flags(&memory_state(repo), FlagParams::from_query(&query), now())
            .await
            .expect("detect");
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].student.id, "pair");
        assert_eq!(flags[0].count, 2);
    }

    #[tokio::test]
    async fn window_days_zero_behaves_like_one_day() {
        let entries: Vec<AuditLogEntry> = (0..6)
            .map(|i| correction("s1", "c1", now() - Duration::hours(30 + i), "absent", "present"))
            .collect();
        let repo = seeded(entries, Vec::new()).await;
        let state = memory_state(repo);

        let zero = FlagQuery {
            window_days: Some("0".to_string()),
            ..FlagQuery::default()
        };
        let one = FlagQuery {
            window_days: Some("1".to_string()),
            ..FlagQuery::default()
        };
        let from_zero = detect_flags(&state, FlagParams::from_query(&zero), now())
            .await
            .expect("detect");
        let from_one = detect_flags(&state, FlagParams::from_query(&one), now())
            .await
            .expect("detect");
        assert!(from_zero.is_empty());
        assert_eq!(from_zero, from_one);
    }

    #[tokio::test]
    async fn flags_carry_directory_details() {
        let entries: Vec<AuditLogEntry> = (0..5)
            .map(|i| correction("s1", "c1", now() - Duration::hours(i), "late", "present"))
            .collect();
        let repo = seeded(entries, Vec::new()).await;
        repo.add_users(vec![UserSummary {
            id: "s1".to_string(),
            name: "Grace".to_string(),
            email: "grace@uni.edu".to_string(),
            role: "student".to_string(),
            student_id: Some("2023-117".to_string()),
        }])
        .await;
        repo.add_courses(vec![CourseSummary {
            id: "c1".to_string(),
            name: "Operating Systems".to_string(),
            code: "CS-330".to_string(),
        }])
        .await;

        let flags = detect_flags(&memory_state(repo), FlagParams::default(), now())
            .await
            .expect("detect");
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].student.email.as_deref(), Some("grace@uni.edu"));
        assert_eq!(flags[0].student.student_id.as_deref(), Some("2023-117"));
        assert_eq!(flags[0].course.name.as_deref(), Some("Operating Systems"));
    }

    struct FailingCalendar;

    #[async_trait]
    impl CalendarRepository for FailingCalendar {
        async fn fetch_exam_events(
            &self,
            _from: DateTime<Utc>,
            _to: DateTime<Utc>,
        ) -> anyhow::Result<Vec<ExamEvent>> {
            Err(anyhow!("calendar store unavailable"))
        }
    }

    #[tokio::test]
    async fn calendar_failure_fails_the_whole_request() {
        let entries: Vec<AuditLogEntry> = (0..8)
            .map(|i| correction("s1", "c1", now() - Duration::hours(i), "absent", "present"))
            .collect();
        let repo = seeded(entries, Vec::new()).await;
        let mut state = memory_state(repo);
        state.calendar_repo = Arc::new(FailingCalendar);

        let err = list_flags(&state, FlagQuery::default())
            .await
            .expect_err("calendar failure must surface");
        match err {
            AppError::Internal(inner) => {
                assert_eq!(inner.to_string(), "failed to compute audit flags")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let metrics = state.metrics.render_prometheus();
        assert!(metrics.contains("rollcall_flag_errors_total 1\n"));
        assert!(metrics.contains("rollcall_flags_emitted_total 0\n"));
    }
}
