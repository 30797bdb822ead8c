use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{CourseCount, ExtractionSummary, GradeRecord};

/// Course name used when a page carries no recognizable header.
pub const UNKNOWN_COURSE: &str = "Desconocido";

static COURSE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ASIGNATURA:\s*\[[0-9]+\]\s*-\s*[\w-]+\s*-\s*(.+?)\s+GRUPO:")
        .expect("valid course header regex")
});

static STUDENT_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{8,10}").expect("valid student id regex"));

static FINAL_GRADE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]{2})\s*$").expect("valid final grade regex"));

static DIGITS_OR_DOTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]+|\.").expect("valid digit regex"));

static LEADING_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\s+").expect("valid leading code regex"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

pub fn course_from_header(page_text: &str) -> String {
    COURSE_HEADER
        .captures(page_text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_else(|| UNKNOWN_COURSE.to_string())
}

/// Display cleanup for the text between the student id and the grade.
/// Keeps the original casing; join keys come from `normalize::canonicalize`.
pub fn clean_name(raw: &str) -> String {
    let cleaned = DIGITS_OR_DOTS.replace_all(raw, "");
    let cleaned = LEADING_CODE.replace(&cleaned, "");
    WHITESPACE.replace_all(&cleaned, " ").trim().to_string()
}

fn parse_line(line: &str, course: &str) -> Option<GradeRecord> {
    let id = STUDENT_ID.find(line)?;
    let grade = FINAL_GRADE.captures(line)?.get(1)?;

    // A grade token that overlaps the id would give an inverted slice.
    if grade.start() < id.end() {
        return None;
    }

    let final_grade = grade.as_str().parse::<u8>().ok()?;
    let raw_name = &line[id.end()..grade.start()];

    Some(GradeRecord {
        course: course.to_string(),
        student_name: clean_name(raw_name),
        final_grade,
    })
}

/// Recovers every grade record on one page. Lines without an id token or a
/// trailing two-digit grade are skipped.
pub fn extract_page(page_text: &str) -> Vec<GradeRecord> {
    let course = course_from_header(page_text);
    page_text
        .lines()
        .filter_map(|line| parse_line(line, &course))
        .collect()
}

pub fn extract_pages<S: AsRef<str>>(pages: &[S]) -> Vec<GradeRecord> {
    let mut records = Vec::new();
    for (page_idx, page) in pages.iter().enumerate() {
        let page_records = extract_page(page.as_ref());
        tracing::debug!(
            page = page_idx + 1,
            records = page_records.len(),
            "Extracted page"
        );
        records.extend(page_records);
    }
    records
}

pub fn summarize(records: &[GradeRecord]) -> ExtractionSummary {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut per_course: Vec<CourseCount> = Vec::new();

    for record in records {
        match index.get(record.course.as_str()) {
            Some(&pos) => per_course[pos].count += 1,
            None => {
                index.insert(record.course.as_str(), per_course.len());
                per_course.push(CourseCount {
                    course: record.course.clone(),
                    count: 1,
                });
            }
        }
    }

    per_course.sort_by(|a, b| b.count.cmp(&a.count));

    ExtractionSummary {
        total_records: records.len(),
        distinct_courses: per_course.len(),
        records_per_course: per_course,
    }
}
