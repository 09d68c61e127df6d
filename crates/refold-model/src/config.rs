//! Run configuration.
//!
//! Mirrors the nesting the network checkpoints use: `model.global_config`
//! carries the mode switch, `model.*` the recycling and early-stop knobs.
//! Deserializable from JSON alongside the weights.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreRanker {
    Plddt,
    Ptm,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub multimer_mode: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            multimer_mode: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub global_config: GlobalConfig,
    /// Extra recycling passes beyond the first; the loop runs
    /// `num_recycle + 1` iterations in multimer mode.
    pub num_recycle: usize,
    pub stop_at_score_ranker: ScoreRanker,
    /// Early-stop threshold on the ranking score. Scores are bounded by 1, so
    /// the default never triggers.
    pub stop_at_score: f32,
    /// Cap on MSA rows kept during single-chain feature assembly.
    pub max_msa_clusters: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            global_config: GlobalConfig::default(),
            num_recycle: 3,
            stop_at_score_ranker: ScoreRanker::Plddt,
            stop_at_score: 1.0,
            max_msa_clusters: 128,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
}

impl RunConfig {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert!(!config.model.global_config.multimer_mode);
        assert_eq!(config.model.num_recycle, 3);
        assert_eq!(config.model.stop_at_score_ranker, ScoreRanker::Plddt);
        assert_eq!(config.model.stop_at_score, 1.0);
    }

    #[test]
    fn test_from_json_overrides() {
        let config = RunConfig::from_json(
            r#"{
                "model": {
                    "global_config": { "multimer_mode": true },
                    "num_recycle": 1,
                    "stop_at_score_ranker": "ptm",
                    "stop_at_score": 0.85
                }
            }"#,
        )
        .unwrap();
        assert!(config.model.global_config.multimer_mode);
        assert_eq!(config.model.num_recycle, 1);
        assert_eq!(config.model.stop_at_score_ranker, ScoreRanker::Ptm);
        assert_eq!(config.model.stop_at_score, 0.85);
        // untouched fields keep their defaults
        assert_eq!(config.model.max_msa_clusters, 128);
    }
}
