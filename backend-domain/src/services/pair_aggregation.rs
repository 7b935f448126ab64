use std::collections::HashMap;

use crate::entities::{AuditLogEntry, PairAggregation, PairGroup};
use crate::value_objects::PairKey;

/// Row cap applied to every rule's grouped result.
pub const GROUP_LIMIT: usize = 200;

/// In-process counterpart of the store-side `GROUP BY (student, course)`.
/// Entries without both identifiers cannot be attributed to a pair and are
/// skipped.
pub fn aggregate_pairs<'a, I>(entries: I, query: &PairAggregation) -> Vec<PairGroup>
where
    I: IntoIterator<Item = &'a AuditLogEntry>,
{
    let mut groups: HashMap<PairKey, PairGroup> = HashMap::new();
    for entry in entries {
        if !query.matches(entry) {
            continue;
        }
        let (Some(student_id), Some(course_id)) = (&entry.student_id, &entry.course_id) else {
            continue;
        };
        let key = PairKey::new(student_id.as_str(), course_id.as_str());
        groups
            .entry(key)
            .and_modify(|group| {
                group.count += 1;
                group.first_seen = group.first_seen.min(entry.created_at);
                group.last_seen = group.last_seen.max(entry.created_at);
            })
            .or_insert_with(|| PairGroup {
                student_id: student_id.clone(),
                course_id: course_id.clone(),
                count: 1,
                first_seen: entry.created_at,
                last_seen: entry.created_at,
            });
    }

    let mut rows: Vec<PairGroup> = groups
        .into_values()
        .filter(|group| group.count >= query.min_count)
        .collect();
    sort_and_cap(&mut rows, query.limit);
    rows
}

/// Count desc, then most recent activity first. Identifiers break the
/// remaining ties so results are deterministic.
pub fn sort_and_cap(rows: &mut Vec<PairGroup>, limit: usize) {
    rows.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| b.last_seen.cmp(&a.last_seen))
            .then_with(|| a.student_id.cmp(&b.student_id))
            .then_with(|| a.course_id.cmp(&b.course_id))
    });
    rows.truncate(limit);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::ATTENDANCE_UPDATE;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::Map;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 12, 0, 0).unwrap()
    }

    fn entry(student: &str, course: &str, minutes_ago: i64, old: &str, new: &str) -> AuditLogEntry {
        AuditLogEntry {
            id: format!("{}-{}-{}", student, course, minutes_ago),
            actor_id: Some("teacher-1".to_string()),
            actor_role: "teacher".to_string(),
            action: ATTENDANCE_UPDATE.to_string(),
            student_id: Some(student.to_string()),
            course_id: Some(course.to_string()),
            old_status: Some(old.to_string()),
            new_status: Some(new.to_string()),
            correction_reason: None,
            meta: Map::new(),
            created_at: base_time() - Duration::minutes(minutes_ago),
        }
    }

    fn query(min_count: u64) -> PairAggregation {
        PairAggregation {
            action: ATTENDANCE_UPDATE.to_string(),
            since: base_time() - Duration::days(7),
            until: None,
            present_changes_only: false,
            course_id: None,
            min_count,
            limit: GROUP_LIMIT,
        }
    }

    #[test]
    fn groups_by_pair_and_tracks_bounds() {
        let entries = vec![
            entry("s1", "c1", 30, "absent", "present"),
            entry("s1", "c1", 10, "present", "late"),
            entry("s1", "c1", 50, "absent", "present"),
            entry("s2", "c1", 5, "absent", "present"),
        ];
        let rows = aggregate_pairs(&entries, &query(1));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].student_id, "s1");
        assert_eq!(rows[0].count, 3);
        assert_eq!(rows[0].first_seen, base_time() - Duration::minutes(50));
        assert_eq!(rows[0].last_seen, base_time() - Duration::minutes(10));
        assert_eq!(rows[1].student_id, "s2");
    }

    #[test]
    fn threshold_and_present_filter_apply() {
        let entries = vec![
            entry("s1", "c1", 30, "absent", "present"),
            entry("s1", "c1", 20, "present", "present"),
            entry("s1", "c1", 10, "late", "present"),
            entry("s2", "c2", 10, "absent", "present"),
        ];
        let mut present_only = query(2);
        present_only.present_changes_only = true;
        let rows = aggregate_pairs(&entries, &present_only);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);
    }

    #[test]
    fn skips_entries_outside_window_or_without_pair() {
        let mut stale = entry("s1", "c1", 0, "absent", "present");
        stale.created_at = base_time() - Duration::days(8);
        let mut orphan = entry("s1", "c1", 5, "absent", "present");
        orphan.course_id = None;
        let mut other_action = entry("s1", "c1", 5, "absent", "present");
        other_action.action = "USER_UPDATE".to_string();
        let entries = vec![stale, orphan, other_action];
        assert!(aggregate_pairs(&entries, &query(1)).is_empty());
    }

    #[test]
    fn equal_counts_order_by_last_seen_and_cap() {
        let entries = vec![
            entry("old", "c1", 100, "absent", "present"),
            entry("new", "c1", 1, "absent", "present"),
            entry("mid", "c1", 50, "absent", "present"),
        ];
        let mut capped = query(1);
        capped.limit = 2;
        let rows = aggregate_pairs(&entries, &capped);
        let students: Vec<&str> = rows.iter().map(|row| row.student_id.as_str()).collect();
        assert_eq!(students, vec!["new", "mid"]);
    }
}
