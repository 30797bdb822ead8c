use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{AnalysisReport, DatasetSummary, ExtractionSummary};

fn format_mean(summary: &DatasetSummary) -> String {
    summary
        .mean_grade
        .map(|mean| format!("{mean:.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

pub fn build_report(report: &AnalysisReport, generated_on: NaiveDate) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Academic Risk Report");
    let _ = writeln!(
        output,
        "Generated on {} (passing grade {}, repeat threshold {}, critical threshold {})",
        generated_on,
        report.config.passing_grade,
        report.config.repeat_threshold,
        report.config.critical_threshold
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Repeated Course Failures");
    let _ = writeln!(
        output,
        "{} cases across {} students",
        report.total_repeat_cases, report.unique_repeat_students
    );

    if report.repeated_failures.is_empty() {
        let _ = writeln!(
            output,
            "No students failed the same course in {} or more periods.",
            report.config.repeat_threshold
        );
    } else {
        for group in report.repeated_failures.iter().take(20) {
            let periods: Vec<String> = group
                .occurrences
                .iter()
                .map(|o| format!("{} ({})", o.period_label, o.grade))
                .collect();
            let _ = writeln!(
                output,
                "- {} [{}] failed {} {} times: {}",
                group.student_key,
                group.org_unit,
                group.course,
                group.times_failed,
                periods.join(", ")
            );
        }
    }

    for period in &report.periods {
        let summary = &period.summary;
        let _ = writeln!(output);
        let _ = writeln!(output, "## {}", summary.period_label);
        let _ = writeln!(
            output,
            "- Unit: {}",
            summary.org_unit.as_deref().unwrap_or("unassigned")
        );
        let _ = writeln!(
            output,
            "- Students: {} ({} passing, {} failing by average)",
            summary.total_students, summary.pass_count, summary.fail_count
        );
        let _ = writeln!(output, "- Mean grade: {}", format_mean(summary));

        if !summary.top_failed_courses.is_empty() {
            let _ = writeln!(output, "- Most failed courses:");
            for course in &summary.top_failed_courses {
                let _ = writeln!(output, "  - {}: {}", course.course, course.count);
            }
        }

        if period.critical_students.is_empty() {
            let _ = writeln!(output, "- No students at critical risk.");
        } else {
            let _ = writeln!(output, "- Critical risk:");
            for student in &period.critical_students {
                let courses: Vec<String> = student
                    .failed_courses
                    .iter()
                    .map(|c| format!("{} ({})", c.course, c.grade))
                    .collect();
                let _ = writeln!(
                    output,
                    "  - {} failed {}: {}",
                    student.student_key,
                    student.total_failed,
                    courses.join(", ")
                );
            }
        }
    }

    if !report.load_failures.is_empty() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Datasets Not Loaded");
        for failure in &report.load_failures {
            let _ = writeln!(
                output,
                "- {} ({}): {}",
                failure.tag,
                failure.path.display(),
                failure.error
            );
        }
    }

    output
}

pub fn build_extraction_summary(summary: &ExtractionSummary) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Total records: {}", summary.total_records);
    let _ = writeln!(output, "Total courses: {}", summary.distinct_courses);
    for course in &summary.records_per_course {
        let _ = writeln!(output, "- {}: {}", course.course, course.count);
    }
    output
}
