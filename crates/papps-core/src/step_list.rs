use serde::{Deserialize, Serialize};

use crate::step::{ExternalTool, InstallStep};

/// Ordered install steps with all-or-nothing semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepList {
    steps: Vec<InstallStep>,
}

impl StepList {
    pub fn new(steps: Vec<InstallStep>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[InstallStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, InstallStep> {
        self.steps.iter()
    }

    pub fn push(&mut self, step: InstallStep) {
        self.steps.push(step);
    }

    /// First invalid step, prefixed with its manifest key.
    pub fn validate(&self) -> Option<String> {
        self.steps.iter().find_map(|step| {
            step.validate()
                .map(|message| format!("{}: {message}", step.type_name()))
        })
    }

    pub fn required_tools(&self) -> Vec<ExternalTool> {
        let mut tools = Vec::new();
        for tool in self.steps.iter().filter_map(InstallStep::required_tool) {
            if !tools.contains(&tool) {
                tools.push(tool);
            }
        }
        tools
    }
}

impl From<Vec<InstallStep>> for StepList {
    fn from(steps: Vec<InstallStep>) -> Self {
        Self::new(steps)
    }
}

impl<'a> IntoIterator for &'a StepList {
    type Item = &'a InstallStep;
    type IntoIter = std::slice::Iter<'a, InstallStep>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}
