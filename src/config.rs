use anyhow::bail;
use serde::Serialize;

pub const PASSING_GRADE: f64 = 11.0;
pub const REPEAT_THRESHOLD: usize = 2;
pub const STRICT_REPEAT_THRESHOLD: usize = 3;
pub const CRITICAL_THRESHOLD: usize = 3;
pub const TOP_COURSES_LIMIT: usize = 10;
pub const DEFAULT_ORG_UNITS: [&str; 2] = ["Biologia", "Veterinaria"];

/// Thresholds and unit names for one aggregation run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisConfig {
    pub passing_grade: f64,
    pub repeat_threshold: usize,
    pub critical_threshold: usize,
    pub top_courses_limit: usize,
    pub org_units: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            passing_grade: PASSING_GRADE,
            repeat_threshold: REPEAT_THRESHOLD,
            critical_threshold: CRITICAL_THRESHOLD,
            top_courses_limit: TOP_COURSES_LIMIT,
            org_units: DEFAULT_ORG_UNITS.iter().map(|unit| unit.to_string()).collect(),
        }
    }
}

impl AnalysisConfig {
    pub fn strict() -> Self {
        Self {
            repeat_threshold: STRICT_REPEAT_THRESHOLD,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.passing_grade.is_finite() {
            bail!("passing grade must be a finite number");
        }
        if self.repeat_threshold == 0 {
            bail!("repeat threshold must be at least 1");
        }
        if self.critical_threshold == 0 {
            bail!("critical threshold must be at least 1");
        }
        if self.top_courses_limit == 0 {
            bail!("top courses limit must be at least 1");
        }
        for (idx, unit) in self.org_units.iter().enumerate() {
            if unit.trim().is_empty() {
                bail!("organizational unit names cannot be empty");
            }
            if self.org_units[..idx].contains(unit) {
                bail!("organizational unit {unit} is listed twice");
            }
        }
        Ok(())
    }

    /// First configured unit whose name appears inside `tag`.
    pub fn unit_for(&self, tag: &str) -> Option<&str> {
        self.org_units
            .iter()
            .find(|unit| tag.contains(unit.as_str()))
            .map(String::as_str)
    }

    pub fn is_failing(&self, grade: f64) -> bool {
        grade < self.passing_grade
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_grading_rules() {
        let config = AnalysisConfig::default();
        assert_eq!(config.passing_grade, 11.0);
        assert_eq!(config.repeat_threshold, 2);
        assert_eq!(config.critical_threshold, 3);
        assert_eq!(config.top_courses_limit, 10);
        assert!(config.validate().is_ok());
        assert_eq!(AnalysisConfig::strict().repeat_threshold, 3);
    }

    #[test]
    fn unit_lookup_uses_substring_containment() {
        let config = AnalysisConfig::default();
        assert_eq!(config.unit_for("2024-2-Biologia"), Some("Biologia"));
        assert_eq!(
            config.unit_for("2025-1-Medicina Veterinaria"),
            Some("Veterinaria")
        );
        assert_eq!(config.unit_for("2025-1-biologia"), None);
        assert_eq!(config.unit_for("2025-1-Quimica"), None);
    }

    #[test]
    fn failing_is_strictly_below_passing_grade() {
        let config = AnalysisConfig::default();
        assert!(config.is_failing(10.9));
        assert!(!config.is_failing(11.0));
    }

    #[test]
    fn rejects_invalid_settings() {
        let mut config = AnalysisConfig::default();
        config.repeat_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.org_units.push("Biologia".to_string());
        assert!(config.validate().is_err());

        let mut config = AnalysisConfig::default();
        config.passing_grade = f64::NAN;
        assert!(config.validate().is_err());
    }
}
