// Identifier value objects

/// Grouping key of every flag rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PairKey {
    pub student_id: String,
    pub course_id: String,
}

impl PairKey {
    pub fn new(student_id: impl Into<String>, course_id: impl Into<String>) -> Self {
        Self {
            student_id: student_id.into(),
            course_id: course_id.into(),
        }
    }
}
