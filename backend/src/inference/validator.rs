use skin_shared::{SkinCondition, SkinPredictionResponse};
use std::str::FromStr;

use super::classifier::PredictionResult;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Unknown skin condition label: {0:?}")]
    UnknownLabel(String),
    #[error("Confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// Checks a raw prediction against the response contract and rounds its
/// confidence to three decimals, half away from zero.
pub fn validate(result: &PredictionResult) -> Result<SkinPredictionResponse, ValidationError> {
    let skin_condition = SkinCondition::from_str(result.label.trim())
        .map_err(|_| ValidationError::UnknownLabel(result.label.clone()))?;

    if !(0.0..=1.0).contains(&result.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange(result.confidence));
    }

    Ok(SkinPredictionResponse {
        skin_condition,
        probability: round_probability(result.confidence),
    })
}

pub fn round_probability(confidence: f64) -> f64 {
    // Adding positive zero turns -0.0 into 0.0.
    (confidence * 1000.0).round() / 1000.0 + 0.0
}
