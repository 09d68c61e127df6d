//! refold-model
//!
//! Orchestration layer around a pretrained structure-prediction network:
//! feature preparation, lazy parameter handling, and the recycling inference
//! loop with per-iteration confidence scoring and early stopping.
//!
//! The network itself is opaque: anything implementing [`FoldNetwork`] can be
//! driven by [`RunModel`].

pub mod config;
pub mod features;
pub mod network;
pub mod params;
pub mod runner;
mod utilities;

pub use config::{GlobalConfig, ModelConfig, RunConfig, ScoreRanker};
pub use features::{FeatureDict, FeatureExample, RawFeatures};
pub use network::{AlignedError, Batch, FoldNetwork, ModelOutput, PrevState};
pub use params::Params;
pub use runner::{Prediction, RunModel};
pub use utilities::device;
