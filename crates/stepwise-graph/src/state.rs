use serde::{Deserialize, Serialize};

/// A field of `ExecutionState`, used by nodes to declare what they read and write.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    Task,
    E1Uncertainty,
    E2Uncertainty,
    Analysis,
    FinalAnswer,
    AnalysisAttempts,
    MaxAttempts,
}

impl StateField {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateField::Task => "task",
            StateField::E1Uncertainty => "e1_uncertainty",
            StateField::E2Uncertainty => "e2_uncertainty",
            StateField::Analysis => "analysis",
            StateField::FinalAnswer => "final_answer",
            StateField::AnalysisAttempts => "analysis_attempts",
            StateField::MaxAttempts => "max_attempts",
        }
    }
}

impl std::fmt::Display for StateField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record threaded through every step of one run.
///
/// `task` and `max_attempts` are fixed at construction. Everything else
/// changes only through [`ExecutionState::merge`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    task: String,
    e1_uncertainty: Option<String>,
    e2_uncertainty: Option<String>,
    analysis: Option<String>,
    final_answer: Option<String>,
    analysis_attempts: u32,
    max_attempts: u32,
}

impl ExecutionState {
    pub fn new(task: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            task: task.into(),
            e1_uncertainty: None,
            e2_uncertainty: None,
            analysis: None,
            final_answer: None,
            analysis_attempts: 0,
            max_attempts,
        }
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn e1_uncertainty(&self) -> Option<&str> {
        self.e1_uncertainty.as_deref()
    }

    pub fn e2_uncertainty(&self) -> Option<&str> {
        self.e2_uncertainty.as_deref()
    }

    pub fn analysis(&self) -> Option<&str> {
        self.analysis.as_deref()
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn analysis_attempts(&self) -> u32 {
        self.analysis_attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether `field` holds a value a node can read.
    pub fn has(&self, field: StateField) -> bool {
        match field {
            StateField::Task | StateField::AnalysisAttempts | StateField::MaxAttempts => true,
            StateField::E1Uncertainty => self.e1_uncertainty.is_some(),
            StateField::E2Uncertainty => self.e2_uncertainty.is_some(),
            StateField::Analysis => self.analysis.is_some(),
            StateField::FinalAnswer => self.final_answer.is_some(),
        }
    }

    /// Merge a node's patch. Fields the patch does not mention are left alone.
    pub fn merge(&mut self, patch: StatePatch) {
        if let Some(v) = patch.e1_uncertainty {
            self.e1_uncertainty = Some(v);
        }
        if let Some(v) = patch.e2_uncertainty {
            self.e2_uncertainty = Some(v);
        }
        if let Some(v) = patch.analysis {
            self.analysis = Some(v);
        }
        if let Some(v) = patch.final_answer {
            self.final_answer = Some(v);
        }
        if let Some(v) = patch.analysis_attempts {
            self.analysis_attempts = v;
        }
    }
}

/// Partial update returned by a node. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub e1_uncertainty: Option<String>,
    pub e2_uncertainty: Option<String>,
    pub analysis: Option<String>,
    pub final_answer: Option<String>,
    pub analysis_attempts: Option<u32>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_e1_uncertainty(mut self, value: impl Into<String>) -> Self {
        self.e1_uncertainty = Some(value.into());
        self
    }

    pub fn with_e2_uncertainty(mut self, value: impl Into<String>) -> Self {
        self.e2_uncertainty = Some(value.into());
        self
    }

    pub fn with_analysis(mut self, value: impl Into<String>) -> Self {
        self.analysis = Some(value.into());
        self
    }

    pub fn with_final_answer(mut self, value: impl Into<String>) -> Self {
        self.final_answer = Some(value.into());
        self
    }

    pub fn with_analysis_attempts(mut self, attempts: u32) -> Self {
        self.analysis_attempts = Some(attempts);
        self
    }

    /// Fields this patch writes.
    pub fn fields(&self) -> Vec<StateField> {
        let mut fields = Vec::new();
        if self.e1_uncertainty.is_some() {
            fields.push(StateField::E1Uncertainty);
        }
        if self.e2_uncertainty.is_some() {
            fields.push(StateField::E2Uncertainty);
        }
        if self.analysis.is_some() {
            fields.push(StateField::Analysis);
        }
        if self.final_answer.is_some() {
            fields.push(StateField::FinalAnswer);
        }
        if self.analysis_attempts.is_some() {
            fields.push(StateField::AnalysisAttempts);
        }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}
