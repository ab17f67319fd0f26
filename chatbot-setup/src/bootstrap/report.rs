//! Per-step outcomes and the final summary.

use std::fmt;

/// The steps of the bootstrap sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    RefreshIndex,
    SystemUpgrade,
    PythonRequirements,
    Runtime,
    HealthCheck,
}

impl Step {
    pub fn label(&self) -> &'static str {
        match self {
            Step::RefreshIndex => "package index refresh",
            Step::SystemUpgrade => "system upgrade",
            Step::PythonRequirements => "Python requirements",
            Step::Runtime => "Ollama runtime",
            Step::HealthCheck => "Ollama health check",
        }
    }

    /// Advisory steps never stop the sequence, even under the strict policy.
    pub fn is_advisory(&self) -> bool {
        matches!(self, Step::HealthCheck)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What a step ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step changed the host.
    Done,
    /// Desired state was already in place.
    AlreadySatisfied,
    /// Not applicable or declined.
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// Ordered record of every step that ran.
#[derive(Debug, Default)]
pub struct SetupReport {
    pub steps: Vec<(Step, StepOutcome)>,
    /// Set when the strict policy stopped the sequence.
    pub aborted_at: Option<Step>,
}

impl SetupReport {
    pub fn record(&mut self, step: Step, outcome: StepOutcome) {
        self.steps.push((step, outcome));
    }

    #[cfg(test)]
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, outcome)| outcome)
    }

    pub fn failures(&self) -> impl Iterator<Item = (Step, &str)> {
        self.steps.iter().filter_map(|(step, outcome)| match outcome {
            StepOutcome::Failed(reason) => Some((*step, reason.as_str())),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn completed(&self) -> bool {
        self.aborted_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_in_order() {
        let mut report = SetupReport::default();
        report.record(Step::RefreshIndex, StepOutcome::Failed("apt down".into()));
        report.record(Step::SystemUpgrade, StepOutcome::Skipped("declined".into()));
        report.record(Step::PythonRequirements, StepOutcome::Done);
        report.record(Step::Runtime, StepOutcome::Failed("no network".into()));

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(
            failures,
            vec![
                (Step::RefreshIndex, "apt down"),
                (Step::Runtime, "no network")
            ]
        );
        assert!(!report.is_clean());
        assert!(report.completed());
    }

    #[test]
    fn test_outcome_lookup() {
        let mut report = SetupReport::default();
        report.record(Step::Runtime, StepOutcome::AlreadySatisfied);
        assert_eq!(report.outcome(Step::Runtime), Some(&StepOutcome::AlreadySatisfied));
        assert_eq!(report.outcome(Step::HealthCheck), None);
        assert!(report.is_clean());
    }

    #[test]
    fn test_only_health_check_is_advisory() {
        assert!(Step::HealthCheck.is_advisory());
        assert!(!Step::PythonRequirements.is_advisory());
    }
}
