use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};

mod config;
mod dataset;
mod extract;
mod logging;
mod models;
mod normalize;
mod pdf;
mod report;
mod risk;

use config::AnalysisConfig;
use dataset::DatasetSource;

#[derive(Parser)]
#[command(name = "grade-risk-audit")]
#[command(about = "Grade record extraction and repeated-failure detection", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract grade records from a grade report into a CSV file
    #[command(group(
        ArgGroup::new("input")
            .args(["pdf", "pages"])
            .required(true)
            .multiple(false)
    ))]
    Extract {
        /// Grade report PDF, read page by page
        #[arg(long)]
        pdf: Option<PathBuf>,
        /// Plain text with one form feed between pages
        #[arg(long)]
        pages: Option<PathBuf>,
        #[arg(long, default_value = "notas_estudiantes.csv")]
        out: PathBuf,
    },
    /// Detect repeated failures and critical students across periods
    Analyze {
        /// Period datasets in chronological order
        #[arg(long = "dataset", required = true)]
        datasets: Vec<PathBuf>,
        /// Organizational unit names matched against dataset file names
        #[arg(long = "unit")]
        units: Vec<String>,
        #[arg(long, default_value_t = config::PASSING_GRADE)]
        passing_grade: f64,
        #[arg(long, conflicts_with = "strict")]
        repeat_threshold: Option<usize>,
        /// Require three failed periods instead of two
        #[arg(long)]
        strict: bool,
        #[arg(long, default_value_t = config::CRITICAL_THRESHOLD)]
        critical_threshold: usize,
        #[arg(long, default_value_t = config::TOP_COURSES_LIMIT)]
        top_courses: usize,
        #[arg(long, default_value = "analysis.json")]
        json: PathBuf,
        /// Optional markdown summary
        #[arg(long = "report")]
        markdown: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            pdf: pdf_path,
            pages,
            out,
        } => {
            let page_texts = match (pdf_path, pages) {
                (Some(path), _) => pdf::read_pdf_pages(&path)?,
                (None, Some(path)) => pdf::read_text_pages(&path)?,
                (None, None) => anyhow::bail!("either --pdf or --pages is required"),
            };

            let records = extract::extract_pages(page_texts.as_slice());
            dataset::write_records(&out, &records)
                .with_context(|| format!("failed to write {}", out.display()))?;

            println!("Wrote {} records to {}.", records.len(), out.display());
            print!("{}", report::build_extraction_summary(&extract::summarize(&records)));
        }
        Commands::Analyze {
            datasets,
            units,
            passing_grade,
            repeat_threshold,
            strict,
            critical_threshold,
            top_courses,
            json,
            markdown,
        } => {
            let mut config = if strict {
                AnalysisConfig::strict()
            } else {
                AnalysisConfig::default()
            };
            if let Some(threshold) = repeat_threshold {
                config.repeat_threshold = threshold;
            }
            if !units.is_empty() {
                config.org_units = units;
            }
            config.passing_grade = passing_grade;
            config.critical_threshold = critical_threshold;
            config.top_courses_limit = top_courses;
            config.validate().context("invalid analysis settings")?;

            let sources: Vec<DatasetSource> =
                datasets.into_iter().map(DatasetSource::from_path).collect();
            let outcome = dataset::load_all(&sources, &config);
            let analysis = risk::analyze(outcome, &config);

            let body = serde_json::to_string_pretty(&analysis)?;
            std::fs::write(&json, body)
                .with_context(|| format!("failed to write {}", json.display()))?;

            println!(
                "Found {} repeated course failures across {} students.",
                analysis.total_repeat_cases, analysis.unique_repeat_students
            );
            for period in &analysis.periods {
                println!(
                    "- {}: {} students, {} critical",
                    period.summary.period_label,
                    period.summary.total_students,
                    period.critical_students.len()
                );
            }
            if !analysis.load_failures.is_empty() {
                println!("{} datasets could not be loaded.", analysis.load_failures.len());
            }
            println!("Analysis written to {}.", json.display());

            if let Some(path) = markdown {
                let today = chrono::Local::now().date_naive();
                std::fs::write(&path, report::build_report(&analysis, today))
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("Report written to {}.", path.display());
            }
        }
    }

    Ok(())
}
