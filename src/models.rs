use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;

/// One `(course, student, grade)` triple recovered from a page of report text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    #[serde(rename = "Curso")]
    pub course: String,
    #[serde(rename = "Nombre")]
    pub student_name: String,
    #[serde(rename = "PFinal")]
    pub final_grade: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct CourseCount {
    pub course: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractionSummary {
    pub total_records: usize,
    pub distinct_courses: usize,
    pub records_per_course: Vec<CourseCount>,
}

/// A row after load-time cleaning. `grade` is `None` when the cell was not numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRow {
    pub student: String,
    pub course: String,
    pub grade: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct PeriodDataset {
    pub period_label: String,
    pub org_unit: Option<String>,
    pub rows: Vec<DatasetRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadFailure {
    pub tag: String,
    pub path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub datasets: Vec<PeriodDataset>,
    pub failures: Vec<LoadFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureHistoryEntry {
    pub student_key: String,
    pub course: String,
    pub period_label: String,
    pub grade: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPeriod {
    pub period_label: String,
    pub grade: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatedFailureGroup {
    pub org_unit: String,
    pub student_key: String,
    pub course: String,
    pub occurrences: Vec<FailedPeriod>,
    pub times_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepeatedCourse {
    pub course: String,
    pub times_failed: usize,
    pub occurrences: Vec<FailedPeriod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentRepeatRollup {
    pub org_unit: String,
    pub student_key: String,
    pub courses: Vec<RepeatedCourse>,
    pub total_repeated_course_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedCourse {
    pub course: String,
    pub grade: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CriticalStudent {
    pub student_key: String,
    pub period_label: String,
    pub failed_courses: Vec<FailedCourse>,
    pub total_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatasetSummary {
    pub period_label: String,
    pub org_unit: Option<String>,
    pub total_students: usize,
    pub graded_rows: usize,
    pub mean_grade: Option<f64>,
    pub pass_count: usize,
    pub fail_count: usize,
    pub top_failed_courses: Vec<CourseCount>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PeriodAnalysis {
    pub summary: DatasetSummary,
    pub critical_students: Vec<CriticalStudent>,
}

/// Everything one aggregation run hands to the presentation layer.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub config: AnalysisConfig,
    pub total_repeat_cases: usize,
    pub unique_repeat_students: usize,
    pub repeated_failures: Vec<RepeatedFailureGroup>,
    pub repeat_rollup: Vec<StudentRepeatRollup>,
    pub periods: Vec<PeriodAnalysis>,
    pub load_failures: Vec<LoadFailure>,
}
