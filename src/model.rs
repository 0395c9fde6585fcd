use crate::normalize::OutputFormat;
use serde::Serialize;
use std::path::PathBuf;

/// One configured dataset: where to fetch it and what to call the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetTask {
    pub key: String,
    pub source_url: Option<String>,
    pub output_filename: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TaskOutcome {
    Skipped {
        reason: String,
    },
    Saved {
        path: PathBuf,
        bytes: usize,
        format: OutputFormat,
    },
    DryRun {
        path: PathBuf,
        bytes: usize,
        format: OutputFormat,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TaskReport {
    pub key: String,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunReport {
    pub tasks: Vec<TaskReport>,
}

impl RunReport {
    pub fn saved(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Saved { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed { .. }))
    }

    pub fn get(&self, key: &str) -> Option<&TaskOutcome> {
        self.tasks
            .iter()
            .find(|report| report.key == key)
            .map(|report| &report.outcome)
    }

    fn count(&self, pred: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tasks.iter().filter(|r| pred(&r.outcome)).count()
    }
}
