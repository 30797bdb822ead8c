use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use csv::ReaderBuilder;
use regex::Regex;
use thiserror::Error;

use crate::config::AnalysisConfig;
use crate::models::{DatasetRow, LoadFailure, LoadOutcome, PeriodDataset};
use crate::normalize::canonicalize;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("cannot open dataset: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("no column matches {column} (headers: {headers})")]
    MissingColumn { column: String, headers: String },
}

/// Header sniffing rule: the first header containing any needle
/// (case-insensitive) wins, otherwise the literal fallback must exist.
struct ColumnRule {
    needles: &'static [&'static str],
    fallback: &'static str,
}

const STUDENT_COLUMN: ColumnRule = ColumnRule {
    needles: &["alum", "nombre"],
    fallback: "Nombre",
};

const COURSE_COLUMN: ColumnRule = ColumnRule {
    needles: &["curso"],
    fallback: "Curso",
};

const GRADE_COLUMN: ColumnRule = ColumnRule {
    needles: &["pfinal", "nota"],
    fallback: "PFinal",
};

static COURSE_CODE_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\s*-\s*").expect("valid course prefix regex"));

#[derive(Debug, Clone)]
pub struct DatasetSource {
    pub path: PathBuf,
    pub tag: String,
}

impl DatasetSource {
    /// Tags the dataset with its file stem, e.g. `2024-2-Biologia`.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let tag = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, tag }
    }
}

fn resolve_column(headers: &[String], rule: &ColumnRule) -> Result<usize, DatasetError> {
    let sniffed = headers.iter().position(|header| {
        let lower = header.to_lowercase();
        rule.needles.iter().any(|needle| lower.contains(needle))
    });

    sniffed
        .or_else(|| headers.iter().position(|header| header == rule.fallback))
        .ok_or_else(|| DatasetError::MissingColumn {
            column: rule.fallback.to_string(),
            headers: headers.join(", "),
        })
}

fn clean_course(raw: &str) -> String {
    COURSE_CODE_PREFIX.replace(raw, "").trim().to_string()
}

fn coerce_grade(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|grade| grade.is_finite())
}

pub fn from_reader<R: Read>(
    reader: R,
    tag: &str,
    config: &AnalysisConfig,
) -> Result<PeriodDataset, DatasetError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let student_col = resolve_column(&headers, &STUDENT_COLUMN)?;
    let course_col = resolve_column(&headers, &COURSE_COLUMN)?;
    let grade_col = resolve_column(&headers, &GRADE_COLUMN)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        if record.iter().all(|value| value.trim().is_empty()) {
            continue;
        }

        rows.push(DatasetRow {
            student: canonicalize(record.get(student_col).unwrap_or_default()),
            course: clean_course(record.get(course_col).unwrap_or_default()),
            grade: record.get(grade_col).and_then(coerce_grade),
        });
    }

    Ok(PeriodDataset {
        period_label: tag.to_string(),
        org_unit: config.unit_for(tag).map(str::to_string),
        rows,
    })
}

pub fn load_dataset(
    source: &DatasetSource,
    config: &AnalysisConfig,
) -> Result<PeriodDataset, DatasetError> {
    let file = File::open(&source.path)?;
    from_reader(file, &source.tag, config)
}

/// Loads every source in order. A dataset that fails is recorded and
/// skipped; the rest still load.
pub fn load_all(sources: &[DatasetSource], config: &AnalysisConfig) -> LoadOutcome {
    let mut outcome = LoadOutcome::default();

    for source in sources {
        match load_dataset(source, config) {
            Ok(dataset) => {
                tracing::debug!(
                    tag = %source.tag,
                    unit = dataset.org_unit.as_deref().unwrap_or("-"),
                    rows = dataset.rows.len(),
                    "Loaded dataset"
                );
                outcome.datasets.push(dataset);
            }
            Err(err) => {
                tracing::warn!(
                    tag = %source.tag,
                    path = %source.path.display(),
                    error = %err,
                    "Skipping dataset that failed to load"
                );
                outcome.failures.push(LoadFailure {
                    tag: source.tag.clone(),
                    path: source.path.clone(),
                    error: err.to_string(),
                });
            }
        }
    }

    outcome
}

pub fn write_records<P: AsRef<Path>, T: serde::Serialize>(
    path: P,
    records: &[T],
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}
