use actix_web::http::StatusCode;
use actix_web::web::{self, Bytes};
use actix_web::{HttpResponse, ResponseError};
use futures::Stream;
use log::{debug, error, info};
use skin_shared::{ErrorEnvelope, SkinPredictionResponse};
use std::fmt::{self, Display};
use std::sync::Arc;

use crate::inference::classifier::{ClassificationError, Classifier, PredictionResult};
use crate::inference::validator::{self, ValidationError};
use crate::storage::temp_store::{StorageError, TempArtifactStore};
use crate::telemetry::Telemetry;

const IMAGE_TYPE_PREFIX: &str = "image/";

// Sent by clients that could not guess a type; the classifier decides.
const UNTYPED_CONTENT: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file was uploaded")]
    MissingFile,
    #[error("Uploaded file is empty")]
    EmptyFile,
    #[error("Unsupported content type: {0}")]
    UnsupportedType(String),
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },
    #[error("Malformed upload: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Io(#[from] StorageError),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl PipelineError {
    pub fn summary(&self) -> &'static str {
        match self {
            PipelineError::Upload(_) => "Invalid upload",
            PipelineError::Io(_) => "There was an error storing the uploaded file",
            PipelineError::Classification(_) => {
                "There was an error classifying the uploaded file"
            }
            PipelineError::Validation(_) => "The classifier returned an invalid prediction",
        }
    }
}

/// Lifecycle of one prediction request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Persisted,
    Classified,
    Validated,
    Failed,
    Responded,
}

impl Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestState::Received => "received",
            RequestState::Persisted => "persisted",
            RequestState::Classified => "classified",
            RequestState::Validated => "validated",
            RequestState::Failed => "failed",
            RequestState::Responded => "responded",
        };
        f.write_str(name)
    }
}

/// The error side of a request, rendered as an `ErrorEnvelope`.
#[derive(Debug)]
pub struct PredictionFailure {
    pub filename: String,
    pub stage: RequestState,
    pub error: PipelineError,
}

impl PredictionFailure {
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            message: self.error.summary().to_string(),
            error: self.error.to_string(),
            filename: self.filename.clone(),
        }
    }
}

impl Display for PredictionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.error.summary(), self.filename, self.error)
    }
}

impl ResponseError for PredictionFailure {
    fn status_code(&self) -> StatusCode {
        match self.error {
            PipelineError::Upload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.envelope())
    }
}

/// One upload as handed over by the HTTP layer.
pub struct UploadedImage<S> {
    pub filename: String,
    pub content_type: Option<String>,
    pub content: S,
}

#[derive(Clone)]
pub struct PredictionPipeline {
    store: TempArtifactStore,
    classifier: Arc<dyn Classifier>,
    telemetry: Arc<dyn Telemetry>,
}

struct Run<'a> {
    filename: &'a str,
    state: RequestState,
}

impl Run<'_> {
    fn advance(&mut self, next: RequestState) {
        debug!("{}: {} -> {}", self.filename, self.state, next);
        self.state = next;
    }
}

impl PredictionPipeline {
    pub fn new(
        store: TempArtifactStore,
        classifier: Arc<dyn Classifier>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            store,
            classifier,
            telemetry,
        }
    }

    /// Runs one upload through persist, classify, release and validate.
    /// The temp artifact is gone by the time this returns, whatever the outcome.
    pub async fn run<S, E>(
        &self,
        upload: UploadedImage<S>,
    ) -> Result<SkinPredictionResponse, PredictionFailure>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        let UploadedImage {
            filename,
            content_type,
            content,
        } = upload;
        let mut run = Run {
            filename: &filename,
            state: RequestState::Received,
        };

        let outcome = self.process(&mut run, content_type.as_deref(), content).await;
        let result = match outcome {
            Ok((prediction, response)) => {
                info!(
                    "Predicted {} ({}) for {}",
                    response.skin_condition, response.probability, filename
                );
                self.telemetry.record_success(
                    response.skin_condition.as_ref(),
                    prediction.confidence,
                    &filename,
                );
                Ok(response)
            }
            Err(error) => {
                let stage = run.state;
                run.advance(RequestState::Failed);
                Err(self.fail(&filename, stage, error))
            }
        };

        run.advance(RequestState::Responded);
        result
    }

    /// Reports a request that failed before any artifact was created.
    pub fn reject(&self, filename: &str, error: UploadError) -> PredictionFailure {
        self.fail(filename, RequestState::Received, error.into())
    }

    async fn process<S, E>(
        &self,
        run: &mut Run<'_>,
        content_type: Option<&str>,
        content: S,
    ) -> Result<(PredictionResult, SkinPredictionResponse), PipelineError>
    where
        S: Stream<Item = Result<Bytes, E>>,
        E: Display,
    {
        check_content_type(content_type)?;

        let mut artifact = self.store.acquire(run.filename).await?;
        let written = self
            .store
            .write(&mut artifact, content)
            .await
            .map_err(|e| match e {
                StorageError::TooLarge { limit } => {
                    PipelineError::Upload(UploadError::TooLarge { limit })
                }
                other => PipelineError::Io(other),
            })?;
        if written == 0 {
            return Err(UploadError::EmptyFile.into());
        }
        run.advance(RequestState::Persisted);

        let classified = self.classify(artifact.path().to_path_buf()).await;
        self.store.release(&mut artifact);
        let prediction = classified?;
        run.advance(RequestState::Classified);

        let response = validator::validate(&prediction)?;
        run.advance(RequestState::Validated);
        Ok((prediction, response))
    }

    async fn classify(
        &self,
        path: std::path::PathBuf,
    ) -> Result<PredictionResult, ClassificationError> {
        let classifier = Arc::clone(&self.classifier);
        web::block(move || classifier.classify(&path))
            .await
            .map_err(|_| ClassificationError::Interrupted)?
    }

    fn fail(&self, filename: &str, stage: RequestState, error: PipelineError) -> PredictionFailure {
        error!("Prediction for {} failed after {}: {}", filename, stage, error);
        self.telemetry
            .record_failure(&error.to_string(), filename, &stage.to_string());
        PredictionFailure {
            filename: filename.to_string(),
            stage,
            error,
        }
    }
}

/// Any `image/*` part is handed to the classifier, which owns format support.
fn check_content_type(content_type: Option<&str>) -> Result<(), UploadError> {
    match content_type {
        Some(mime) if mime != UNTYPED_CONTENT && !mime.starts_with(IMAGE_TYPE_PREFIX) => {
            Err(UploadError::UnsupportedType(mime.to_string()))
        }
        _ => Ok(()),
    }
}
