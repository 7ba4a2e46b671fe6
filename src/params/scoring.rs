//! Anomaly scoring methods and prediction modes.
//!
//! A scoring method turns raw per-window scores into an anomaly indicator and,
//! for labelling methods, into `-1` (anomalous) / `1` (normal) labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The statistical rule behind a scoring method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoringRule {
    /// Standardised score against training statistics.
    Iid,
    /// Robust z-score against the trailing median and MAD.
    ContextualAnomaly,
    /// Chi-square test over the trailing observation window.
    ChiSquare,
    /// Two-sided Gaussian tail probability.
    QScore,
    /// Z-score against the trailing observation window.
    SlidingWindow,
    /// Z-score against exponentially weighted statistics.
    AdaptiveSlidingWindow,
    /// Otsu's histogram threshold.
    Otsu,
    /// Percentile threshold.
    Contamination,
    /// Percentile threshold over the trailing observation window.
    AdaptiveContamination,
    /// One-sided Gaussian tail probability.
    QFunction,
    /// Median plus a multiple of the scaled MAD.
    MedianAbsoluteDev,
    /// Mean plus a multiple of the standard deviation.
    Std,
    /// Largest reference score.
    Max,
}

impl ScoringRule {
    const LEGACY: [(ScoringRule, &'static str); 6] = [
        (ScoringRule::Iid, "iid"),
        (ScoringRule::ContextualAnomaly, "Contextual-Anomaly"),
        (ScoringRule::ChiSquare, "Chi-Square"),
        (ScoringRule::QScore, "Q-Score"),
        (ScoringRule::SlidingWindow, "Sliding-Window"),
        (ScoringRule::AdaptiveSlidingWindow, "Adaptive-Sliding-Window"),
    ];

    const THRESHOLDED: [(ScoringRule, &'static str); 7] = [
        (ScoringRule::Otsu, "otsu"),
        (ScoringRule::Contamination, "contamination"),
        (ScoringRule::AdaptiveContamination, "adaptivecontamination"),
        (ScoringRule::QFunction, "qfunction"),
        (ScoringRule::MedianAbsoluteDev, "medianabsolutedev"),
        (ScoringRule::Std, "std"),
        (ScoringRule::Max, "max"),
    ];

    /// Rules that only exist in labelling form.
    pub fn is_legacy(&self) -> bool {
        Self::LEGACY.iter().any(|(r, _)| r == self)
    }

    /// Rules whose threshold is a percentile given by `scoring_threshold`.
    pub fn is_contamination(&self) -> bool {
        matches!(
            self,
            ScoringRule::Contamination | ScoringRule::AdaptiveContamination
        )
    }

    fn base_name(&self) -> &'static str {
        Self::LEGACY
            .iter()
            .chain(Self::THRESHOLDED.iter())
            .find(|(r, _)| r == self)
            .map(|(_, name)| *name)
            .unwrap_or("otsu")
    }
}

/// What a scoring method returns from `predict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreOutput {
    /// Continuous indicator, threshold estimated from training scores.
    Score,
    /// Labels, threshold estimated from training scores.
    Label,
    /// Labels, threshold estimated once from the scored batch itself.
    OneShotLabel,
}

/// A scoring method: a rule plus its output form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScoringMethod {
    rule: ScoringRule,
    output: ScoreOutput,
}

impl ScoringMethod {
    /// Every accepted name, in schema order.
    pub const NAMES: [&'static str; 27] = [
        "iid",
        "Contextual-Anomaly",
        "Chi-Square",
        "Q-Score",
        "Sliding-Window",
        "Adaptive-Sliding-Window",
        "otsu",
        "otsu_label",
        "otsu_oneshot_label",
        "contamination",
        "contamination_oneshot_label",
        "contamination_label",
        "adaptivecontamination",
        "adaptivecontamination_label",
        "adaptivecontamination_oneshot_label",
        "qfunction",
        "qfunction_oneshot_label",
        "qfunction_label",
        "medianabsolutedev",
        "medianabsolutedev_label",
        "medianabsolutedev_oneshot_label",
        "std",
        "std_oneshot_label",
        "std_label",
        "max",
        "max_oneshot_label",
        "max_label",
    ];

    /// Combine a rule and an output form. Legacy rules only label.
    pub fn new(rule: ScoringRule, output: ScoreOutput) -> Option<Self> {
        if rule.is_legacy() && output != ScoreOutput::Label {
            return None;
        }
        Some(Self { rule, output })
    }

    pub fn rule(&self) -> ScoringRule {
        self.rule
    }

    pub fn output(&self) -> ScoreOutput {
        self.output
    }

    /// Whether `predict` returns labels.
    pub fn is_labelling(&self) -> bool {
        self.output != ScoreOutput::Score
    }

    pub fn name(&self) -> String {
        let base = self.rule.base_name();
        if self.rule.is_legacy() {
            return base.to_string();
        }
        match self.output {
            ScoreOutput::Score => base.to_string(),
            ScoreOutput::Label => format!("{base}_label"),
            ScoreOutput::OneShotLabel => format!("{base}_oneshot_label"),
        }
    }
}

impl Default for ScoringMethod {
    fn default() -> Self {
        Self {
            rule: ScoringRule::Otsu,
            output: ScoreOutput::Label,
        }
    }
}

impl FromStr for ScoringMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((rule, _)) = ScoringRule::LEGACY.iter().find(|(_, name)| *name == s) {
            return Ok(Self {
                rule: *rule,
                output: ScoreOutput::Label,
            });
        }
        let (base, output) = if let Some(base) = s.strip_suffix("_oneshot_label") {
            (base, ScoreOutput::OneShotLabel)
        } else if let Some(base) = s.strip_suffix("_label") {
            (base, ScoreOutput::Label)
        } else {
            (s, ScoreOutput::Score)
        };
        ScoringRule::THRESHOLDED
            .iter()
            .find(|(_, name)| *name == base)
            .map(|(rule, _)| Self {
                rule: *rule,
                output,
            })
            .ok_or_else(|| format!("unknown scoring method `{s}`"))
    }
}

impl TryFrom<String> for ScoringMethod {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScoringMethod> for String {
    fn from(method: ScoringMethod) -> Self {
        method.name()
    }
}

impl fmt::Display for ScoringMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// How many outputs a windowed prediction produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionType {
    /// One output per window position.
    #[default]
    Sliding,
    /// A single output for the terminal window.
    Batch,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_round_trips() {
        for name in ScoringMethod::NAMES {
            let method: ScoringMethod = name.parse().unwrap();
            assert_eq!(method.name(), name);
        }
    }

    #[test]
    fn names_are_unique() {
        let mut names = ScoringMethod::NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 27);
    }

    #[test]
    fn suffixes_select_output_form() {
        let m: ScoringMethod = "std".parse().unwrap();
        assert_eq!((m.rule(), m.output()), (ScoringRule::Std, ScoreOutput::Score));
        assert!(!m.is_labelling());

        let m: ScoringMethod = "qfunction_oneshot_label".parse().unwrap();
        assert_eq!(
            (m.rule(), m.output()),
            (ScoringRule::QFunction, ScoreOutput::OneShotLabel)
        );

        let m: ScoringMethod = "Chi-Square".parse().unwrap();
        assert_eq!(m.output(), ScoreOutput::Label);
    }

    #[test]
    fn legacy_rules_only_label() {
        assert!(ScoringMethod::new(ScoringRule::Iid, ScoreOutput::Score).is_none());
        assert!(ScoringMethod::new(ScoringRule::Iid, ScoreOutput::Label).is_some());
        assert!(ScoringMethod::new(ScoringRule::Max, ScoreOutput::OneShotLabel).is_some());
        assert!("iid_label".parse::<ScoringMethod>().is_err());
    }

    #[test]
    fn serde_uses_names() {
        let m: ScoringMethod = serde_json::from_str("\"otsu_label\"").unwrap();
        assert_eq!(m, ScoringMethod::default());
        assert_eq!(serde_json::to_string(&m).unwrap(), "\"otsu_label\"");
        assert!(serde_json::from_str::<ScoringMethod>("\"chi-square\"").is_err());
    }

    #[test]
    fn prediction_type_names() {
        assert_eq!(serde_json::to_string(&PredictionType::Sliding).unwrap(), "\"sliding\"");
        assert_eq!(
            serde_json::from_str::<PredictionType>("\"batch\"").unwrap(),
            PredictionType::Batch
        );
    }
}
