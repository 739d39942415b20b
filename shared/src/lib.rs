use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// The closed set of conditions the classifier may report.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum SkinCondition {
    #[serde(rename = "Boil")]
    #[strum(serialize = "Boil")]
    Boil,
    #[serde(rename = "clear skin")]
    #[strum(serialize = "clear skin")]
    ClearSkin,
    #[serde(rename = "Eczema")]
    #[strum(serialize = "Eczema")]
    Eczema,
    #[serde(rename = "keloids")]
    #[strum(serialize = "keloids")]
    Keloids,
    #[serde(rename = "Vitiligo")]
    #[strum(serialize = "Vitiligo")]
    Vitiligo,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SkinPredictionResponse {
    pub skin_condition: SkinCondition,
    /// Rounded to three decimal places, always within `0.0..=1.0`.
    pub probability: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub message: String,
    pub error: String,
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RootMessage {
    pub message: String,
}
