//! Skin condition prediction service: accepts a facial image upload, runs it
//! through an external classifier and returns a validated prediction.

pub mod config;
pub mod inference;
pub mod pipeline;
pub mod routes;
pub mod storage;
pub mod telemetry;
