use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::ClassifierConfig;

#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error("Failed to start classifier: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("Classifier exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("Classifier produced unreadable output: {0}")]
    MalformedOutput(#[from] serde_json::Error),
    #[error("Classification was interrupted")]
    Interrupted,
}

/// Raw classifier output, before any contract checks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PredictionResult {
    pub label: String,
    #[serde(alias = "probability")]
    pub confidence: f64,
}

impl PredictionResult {
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Maps an image on disk to a label and a confidence score. Called from
/// blocking worker threads, possibly several at once.
pub trait Classifier: Send + Sync {
    fn classify(&self, image_path: &Path) -> Result<PredictionResult, ClassificationError>;
}

/// Runs an external program with the image path as its last argument and reads
/// a JSON prediction from its stdout.
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            program: config.program,
            args: config.args,
            working_dir: config.working_dir,
        }
    }

    pub fn parse_output(stdout: &[u8]) -> Result<PredictionResult, ClassificationError> {
        Ok(serde_json::from_slice(stdout)?)
    }
}

impl Classifier for CommandClassifier {
    fn classify(&self, image_path: &Path) -> Result<PredictionResult, ClassificationError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args).arg(image_path);
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        let output = command.output()?;
        if !output.status.success() {
            return Err(ClassificationError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Self::parse_output(&output.stdout)
    }
}
