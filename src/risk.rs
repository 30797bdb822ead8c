use std::collections::HashMap;

use crate::config::AnalysisConfig;
use crate::models::{
    AnalysisReport, CourseCount, CriticalStudent, DatasetSummary, FailedCourse, FailedPeriod,
    FailureHistoryEntry, LoadOutcome, PeriodAnalysis, PeriodDataset, RepeatedCourse,
    RepeatedFailureGroup, StudentRepeatRollup,
};

/// Failing rows of one dataset, in row order. Rows without a grade never fail.
pub fn failure_history(
    dataset: &PeriodDataset,
    config: &AnalysisConfig,
) -> Vec<FailureHistoryEntry> {
    dataset
        .rows
        .iter()
        .filter_map(|row| {
            let grade = row.grade.filter(|grade| config.is_failing(*grade))?;
            Some(FailureHistoryEntry {
                student_key: row.student.clone(),
                course: row.course.clone(),
                period_label: dataset.period_label.clone(),
                grade,
            })
        })
        .collect()
}

struct StudentFailures {
    student_key: String,
    courses: Vec<(String, Vec<FailedPeriod>)>,
}

fn repeated_in_unit(
    unit: &str,
    datasets: &[&PeriodDataset],
    config: &AnalysisConfig,
) -> Vec<RepeatedFailureGroup> {
    let mut students: Vec<StudentFailures> = Vec::new();
    let mut student_index: HashMap<String, usize> = HashMap::new();

    for dataset in datasets {
        for entry in failure_history(dataset, config) {
            let pos = match student_index.get(&entry.student_key) {
                Some(&pos) => pos,
                None => {
                    student_index.insert(entry.student_key.clone(), students.len());
                    students.push(StudentFailures {
                        student_key: entry.student_key.clone(),
                        courses: Vec::new(),
                    });
                    students.len() - 1
                }
            };

            let occurrence = FailedPeriod {
                period_label: entry.period_label,
                grade: entry.grade,
            };
            let courses = &mut students[pos].courses;
            match courses.iter_mut().find(|(course, _)| *course == entry.course) {
                Some((_, occurrences)) => occurrences.push(occurrence),
                None => courses.push((entry.course, vec![occurrence])),
            }
        }
    }

    let mut groups = Vec::new();
    for student in students {
        for (course, occurrences) in student.courses {
            if occurrences.len() >= config.repeat_threshold {
                groups.push(RepeatedFailureGroup {
                    org_unit: unit.to_string(),
                    student_key: student.student_key.clone(),
                    course,
                    times_failed: occurrences.len(),
                    occurrences,
                });
            }
        }
    }
    groups
}

/// Students who failed the same course in at least `repeat_threshold`
/// periods. Periods are only compared within one organizational unit.
pub fn detect_repeated_failures(
    datasets: &[PeriodDataset],
    config: &AnalysisConfig,
) -> Vec<RepeatedFailureGroup> {
    let mut groups = Vec::new();

    for unit in &config.org_units {
        let unit_datasets: Vec<&PeriodDataset> = datasets
            .iter()
            .filter(|dataset| dataset.org_unit.as_deref() == Some(unit.as_str()))
            .collect();

        if unit_datasets.len() < config.repeat_threshold {
            tracing::warn!(
                unit = %unit,
                datasets = unit_datasets.len(),
                required = config.repeat_threshold,
                "Not enough periods to detect repeated failures"
            );
            continue;
        }

        groups.extend(repeated_in_unit(unit, &unit_datasets, config));
    }

    let unassigned = datasets.iter().filter(|d| d.org_unit.is_none()).count();
    if unassigned > 0 {
        tracing::debug!(unassigned, "Datasets without a unit left out of repeat detection");
    }

    groups.sort_by(|a, b| b.times_failed.cmp(&a.times_failed));
    groups
}

/// Per-student view of repeated failures, keyed by unit and student.
pub fn rollup_by_student(groups: &[RepeatedFailureGroup]) -> Vec<StudentRepeatRollup> {
    let mut rollups: Vec<StudentRepeatRollup> = Vec::new();
    let mut index: HashMap<(&str, &str), usize> = HashMap::new();

    for group in groups {
        let key = (group.org_unit.as_str(), group.student_key.as_str());
        let pos = *index.entry(key).or_insert_with(|| {
            rollups.push(StudentRepeatRollup {
                org_unit: group.org_unit.clone(),
                student_key: group.student_key.clone(),
                courses: Vec::new(),
                total_repeated_course_failures: 0,
            });
            rollups.len() - 1
        });

        let rollup = &mut rollups[pos];
        rollup.courses.push(RepeatedCourse {
            course: group.course.clone(),
            times_failed: group.times_failed,
            occurrences: group.occurrences.clone(),
        });
        rollup.total_repeated_course_failures += group.times_failed;
    }

    rollups.sort_by(|a, b| {
        b.total_repeated_course_failures
            .cmp(&a.total_repeated_course_failures)
    });
    rollups
}

/// Students failing at least `critical_threshold` courses within one period.
pub fn detect_critical_students(
    dataset: &PeriodDataset,
    config: &AnalysisConfig,
) -> Vec<CriticalStudent> {
    let mut students: Vec<CriticalStudent> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in failure_history(dataset, config) {
        let pos = match index.get(&entry.student_key) {
            Some(&pos) => pos,
            None => {
                index.insert(entry.student_key.clone(), students.len());
                students.push(CriticalStudent {
                    student_key: entry.student_key,
                    period_label: entry.period_label,
                    failed_courses: Vec::new(),
                    total_failed: 0,
                });
                students.len() - 1
            }
        };

        let student = &mut students[pos];
        student.failed_courses.push(FailedCourse {
            course: entry.course,
            grade: entry.grade,
        });
        student.total_failed += 1;
    }

    students.retain(|student| student.total_failed >= config.critical_threshold);
    students.sort_by(|a, b| b.total_failed.cmp(&a.total_failed));
    students
}

/// Headline numbers for one period. Pass/fail is decided per student on
/// the mean of that student's grades, not per row.
pub fn summarize_dataset(dataset: &PeriodDataset, config: &AnalysisConfig) -> DatasetSummary {
    let mut per_student: HashMap<&str, (f64, usize)> = HashMap::new();
    let mut grade_total = 0.0;
    let mut graded_rows = 0usize;

    for row in &dataset.rows {
        let entry = per_student.entry(row.student.as_str()).or_insert((0.0, 0));
        if let Some(grade) = row.grade {
            entry.0 += grade;
            entry.1 += 1;
            grade_total += grade;
            graded_rows += 1;
        }
    }

    let mut pass_count = 0;
    let mut fail_count = 0;
    for (total, count) in per_student.values() {
        if *count == 0 {
            continue;
        }
        if config.is_failing(total / *count as f64) {
            fail_count += 1;
        } else {
            pass_count += 1;
        }
    }

    DatasetSummary {
        period_label: dataset.period_label.clone(),
        org_unit: dataset.org_unit.clone(),
        total_students: per_student.len(),
        graded_rows,
        mean_grade: (graded_rows > 0).then(|| grade_total / graded_rows as f64),
        pass_count,
        fail_count,
        top_failed_courses: top_failed_courses(dataset, config),
    }
}

/// Courses ranked by failing rows, ties kept in first-seen order.
pub fn top_failed_courses(dataset: &PeriodDataset, config: &AnalysisConfig) -> Vec<CourseCount> {
    let mut counts: Vec<CourseCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for entry in failure_history(dataset, config) {
        match index.get(&entry.course) {
            Some(&pos) => counts[pos].count += 1,
            None => {
                index.insert(entry.course.clone(), counts.len());
                counts.push(CourseCount {
                    course: entry.course,
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(config.top_courses_limit);
    counts
}

pub fn analyze(outcome: LoadOutcome, config: &AnalysisConfig) -> AnalysisReport {
    let repeated_failures = detect_repeated_failures(&outcome.datasets, config);
    let repeat_rollup = rollup_by_student(&repeated_failures);

    let mut unique_students: Vec<&str> = repeated_failures
        .iter()
        .map(|group| group.student_key.as_str())
        .collect();
    unique_students.sort_unstable();
    unique_students.dedup();
    let unique_repeat_students = unique_students.len();

    let periods = outcome
        .datasets
        .iter()
        .map(|dataset| PeriodAnalysis {
            summary: summarize_dataset(dataset, config),
            critical_students: detect_critical_students(dataset, config),
        })
        .collect();

    AnalysisReport {
        config: config.clone(),
        total_repeat_cases: repeated_failures.len(),
        unique_repeat_students,
        repeated_failures,
        repeat_rollup,
        periods,
        load_failures: outcome.failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::from_reader;
    use crate::models::DatasetRow;

    fn row(student: &str, course: &str, grade: f64) -> DatasetRow {
        DatasetRow {
            student: student.to_string(),
            course: course.to_string(),
            grade: Some(grade),
        }
    }

    fn dataset(label: &str, unit: Option<&str>, rows: Vec<DatasetRow>) -> PeriodDataset {
        PeriodDataset {
            period_label: label.to_string(),
            org_unit: unit.map(str::to_string),
            rows,
        }
    }

    #[test]
    fn failure_history_keeps_only_failing_graded_rows() {
        let mut rows = vec![row("A", "X", 5.0), row("B", "X", 11.0), row("C", "Y", 10.9)];
        rows.push(DatasetRow {
            student: "D".to_string(),
            course: "X".to_string(),
            grade: None,
        });
        let history = failure_history(&dataset("p1", None, rows), &AnalysisConfig::default());
        let students: Vec<&str> = history.iter().map(|e| e.student_key.as_str()).collect();
        assert_eq!(students, vec!["A", "C"]);
        assert_eq!(history[0].period_label, "p1");
    }

    #[test]
    fn repeated_failure_across_two_periods() {
        let datasets = vec![
            dataset("period1", Some("Biologia"), vec![row("A", "X", 5.0)]),
            dataset("period2", Some("Biologia"), vec![row("A", "X", 8.0)]),
        ];
        let groups = detect_repeated_failures(&datasets, &AnalysisConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].student_key, "A");
        assert_eq!(groups[0].course, "X");
        assert_eq!(groups[0].times_failed, 2);
    }

    #[test]
    fn differently_spelled_names_join_across_files() {
        let config = AnalysisConfig::default();
        let first = from_reader(
            "Curso,Nombre,PFinal\nANATOMIA,\"López, María\",07\n".as_bytes(),
            "2024-2-Biologia",
            &config,
        )
        .unwrap();
        let second = from_reader(
            "Alumno,Curso,Nota\nLOPEZ MARIA 2,01 - ANATOMIA,9\n".as_bytes(),
            "2025-1-Biologia",
            &config,
        )
        .unwrap();

        let groups = detect_repeated_failures(&[first, second], &config);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].student_key, "LOPEZ MARIA");
        assert_eq!(groups[0].course, "ANATOMIA");
        assert_eq!(groups[0].times_failed, 2);
    }

    #[test]
    fn units_never_merge() {
        let datasets = vec![
            dataset("2024-2-Biologia", Some("Biologia"), vec![row("A", "X", 5.0)]),
            dataset("2024-2-Veterinaria", Some("Veterinaria"), vec![row("A", "X", 6.0)]),
            dataset("2025-1-Biologia", Some("Biologia"), vec![row("B", "Y", 12.0)]),
            dataset("2025-1-Veterinaria", Some("Veterinaria"), vec![row("B", "Y", 14.0)]),
        ];
        let groups = detect_repeated_failures(&datasets, &AnalysisConfig::default());
        assert!(groups.is_empty());
    }

    #[test]
    fn three_periods_keep_input_order() {
        let datasets = vec![
            dataset("2024-1-Biologia", Some("Biologia"), vec![row("MARIA LOPEZ", "ANATOMY", 8.0)]),
            dataset("2024-2-Biologia", Some("Biologia"), vec![row("MARIA LOPEZ", "ANATOMY", 6.0)]),
            dataset("2025-1-Biologia", Some("Biologia"), vec![row("MARIA LOPEZ", "ANATOMY", 9.0)]),
        ];
        let groups = detect_repeated_failures(&datasets, &AnalysisConfig::default());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].times_failed, 3);
        let periods: Vec<(&str, f64)> = groups[0]
            .occurrences
            .iter()
            .map(|o| (o.period_label.as_str(), o.grade))
            .collect();
        assert_eq!(
            periods,
            vec![("2024-1-Biologia", 8.0), ("2024-2-Biologia", 6.0), ("2025-1-Biologia", 9.0)]
        );
    }

    #[test]
    fn groups_sorted_by_times_failed_with_stable_ties() {
        let datasets = vec![
            dataset(
                "p1",
                Some("Biologia"),
                vec![row("A", "X", 5.0), row("B", "Y", 4.0), row("C", "Z", 3.0)],
            ),
            dataset(
                "p2",
                Some("Biologia"),
                vec![row("A", "X", 5.0), row("B", "Y", 4.0), row("C", "Z", 3.0)],
            ),
            dataset("p3", Some("Biologia"), vec![row("C", "Z", 2.0)]),
        ];
        let groups = detect_repeated_failures(&datasets, &AnalysisConfig::default());
        let order: Vec<(&str, usize)> = groups
            .iter()
            .map(|g| (g.student_key.as_str(), g.times_failed))
            .collect();
        assert_eq!(order, vec![("C", 3), ("A", 2), ("B", 2)]);
    }

    #[test]
    fn strict_threshold_and_precondition_warning() {
        let datasets = vec![
            dataset("p1", Some("Biologia"), vec![row("A", "X", 5.0)]),
            dataset("p2", Some("Biologia"), vec![row("A", "X", 5.0)]),
        ];
        // Two periods cannot satisfy a threshold of three.
        assert!(detect_repeated_failures(&datasets, &AnalysisConfig::strict()).is_empty());
    }

    #[test]
    fn unassigned_datasets_are_left_out() {
        let datasets = vec![
            dataset("p1", None, vec![row("A", "X", 5.0)]),
            dataset("p2", None, vec![row("A", "X", 5.0)]),
        ];
        assert!(detect_repeated_failures(&datasets, &AnalysisConfig::default()).is_empty());
    }

    #[test]
    fn rollup_totals_per_student() {
        let datasets = vec![
            dataset(
                "p1",
                Some("Biologia"),
                vec![row("A", "X", 5.0), row("A", "Y", 4.0), row("B", "X", 1.0)],
            ),
            dataset(
                "p2",
                Some("Biologia"),
                vec![row("A", "X", 5.0), row("A", "Y", 4.0), row("B", "X", 2.0)],
            ),
            dataset("p3", Some("Biologia"), vec![row("B", "X", 3.0)]),
        ];
        let groups = detect_repeated_failures(&datasets, &AnalysisConfig::default());
        let rollup = rollup_by_student(&groups);

        assert_eq!(rollup.len(), 2);
        assert_eq!(rollup[0].student_key, "A");
        assert_eq!(rollup[0].total_repeated_course_failures, 4);
        let courses: Vec<&str> = rollup[0].courses.iter().map(|c| c.course.as_str()).collect();
        assert_eq!(courses, vec!["X", "Y"]);
        assert_eq!(rollup[1].student_key, "B");
        assert_eq!(rollup[1].total_repeated_course_failures, 3);
    }

    #[test]
    fn critical_students_need_three_failed_courses() {
        let data = dataset(
            "p1",
            Some("Biologia"),
            vec![
                row("A", "X", 5.0),
                row("B", "X", 3.0),
                row("A", "Y", 7.0),
                row("B", "Y", 2.0),
                row("A", "Z", 9.0),
                row("B", "Z", 15.0),
                row("C", "X", 1.0),
                row("C", "Y", 1.0),
                row("C", "Z", 1.0),
                row("C", "W", 1.0),
            ],
        );
        let critical = detect_critical_students(&data, &AnalysisConfig::default());
        assert_eq!(critical.len(), 2);
        assert_eq!(critical[0].student_key, "C");
        assert_eq!(critical[0].total_failed, 4);
        assert_eq!(critical[1].student_key, "A");
        let failed: Vec<&str> = critical[1]
            .failed_courses
            .iter()
            .map(|c| c.course.as_str())
            .collect();
        assert_eq!(failed, vec!["X", "Y", "Z"]);
        assert_eq!(critical[1].period_label, "p1");
    }

    #[test]
    fn pass_fail_uses_student_mean() {
        let data = dataset(
            "p1",
            None,
            vec![row("A", "X", 5.0), row("A", "Y", 15.0), row("B", "X", 14.0)],
        );
        let summary = summarize_dataset(&data, &AnalysisConfig::default());
        assert_eq!(summary.total_students, 2);
        assert_eq!(summary.fail_count, 1);
        assert_eq!(summary.pass_count, 1);
        assert_eq!(summary.graded_rows, 3);
        let mean = summary.mean_grade.unwrap();
        assert!((mean - 34.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn ungraded_students_count_but_neither_pass_nor_fail() {
        let data = dataset(
            "p1",
            None,
            vec![DatasetRow {
                student: "A".to_string(),
                course: "X".to_string(),
                grade: None,
            }],
        );
        let summary = summarize_dataset(&data, &AnalysisConfig::default());
        assert_eq!(summary.total_students, 1);
        assert_eq!(summary.pass_count + summary.fail_count, 0);
        assert_eq!(summary.mean_grade, None);
    }

    #[test]
    fn top_courses_ranked_with_first_seen_ties_and_truncated() {
        let mut rows = vec![
            row("A", "QUIMICA", 5.0),
            row("B", "FISICA", 5.0),
            row("C", "QUIMICA", 5.0),
            row("D", "FISICA", 5.0),
        ];
        for idx in 0..12 {
            rows.push(row("E", &format!("CURSO {idx}"), 3.0));
        }
        let ranked = top_failed_courses(&dataset("p1", None, rows), &AnalysisConfig::default());
        assert_eq!(ranked.len(), 10);
        assert_eq!(ranked[0].course, "QUIMICA");
        assert_eq!(ranked[1].course, "FISICA");
        assert_eq!(ranked[2].course, "CURSO 0");
        assert_eq!(ranked[9].course, "CURSO 7");
    }

    #[test]
    fn analyze_bundles_all_views() {
        let outcome = LoadOutcome {
            datasets: vec![
                dataset(
                    "2024-2-Biologia",
                    Some("Biologia"),
                    vec![row("A", "X", 5.0), row("A", "Y", 5.0)],
                ),
                dataset(
                    "2025-1-Biologia",
                    Some("Biologia"),
                    vec![row("A", "X", 6.0), row("A", "Y", 7.0), row("A", "Z", 2.0)],
                ),
            ],
            failures: Vec::new(),
        };
        let report = analyze(outcome, &AnalysisConfig::default());
        assert_eq!(report.total_repeat_cases, 2);
        assert_eq!(report.unique_repeat_students, 1);
        assert_eq!(report.repeat_rollup.len(), 1);
        assert_eq!(report.periods.len(), 2);
        assert!(report.periods[0].critical_students.is_empty());
        assert_eq!(report.periods[1].critical_students.len(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["repeated_failures"][0]["times_failed"], 2);
        assert_eq!(json["config"]["passing_grade"], 11.0);
    }
}
