//! The recycling inference loop.

use crate::config::{RunConfig, ScoreRanker};
use crate::features::{self, FeatureDict, RawFeatures};
use crate::network::{Batch, FoldNetwork, ModelOutput, PrevState};
use crate::params::Params;
use anyhow::{bail, Result};
use candle_core::{Device, Tensor};
use refold_confidence::ConfidenceMetrics;

/// One scored prediction: the raw network output of the last recycling
/// iteration together with its confidence metrics.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub output: ModelOutput,
    pub confidence: ConfidenceMetrics,
    /// The ranking score the early-stop test saw for this iteration.
    pub mean_score: f32,
}

/// Container for the network, its configuration, and its parameters.
///
/// Parameters are set at most once: supplied at construction, loaded from a
/// file, or randomly initialized on first use. Do not share an instance
/// across threads before they are set.
pub struct RunModel {
    config: RunConfig,
    device: Device,
    network: Box<dyn FoldNetwork>,
    params: Option<Params>,
}

impl RunModel {
    pub fn new(
        config: RunConfig,
        device: Device,
        network: Box<dyn FoldNetwork>,
        params: Option<Params>,
    ) -> Self {
        let params = params.filter(|p| !p.is_empty());
        Self {
            config,
            device,
            network,
            params,
        }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn params(&self) -> Option<&Params> {
        self.params.as_ref()
    }

    fn multimer_mode(&self) -> bool {
        self.config.model.global_config.multimer_mode
    }

    /// Iteration budget and sequence length, read from `aatype`. Single-chain
    /// features carry one row per recycling iteration, so both come from its
    /// shape; multimer features are flat and the budget comes from the config.
    fn loop_bounds(&self, feat: &FeatureDict) -> Result<(usize, usize)> {
        let aatype = feat.get("aatype")?;
        if self.multimer_mode() {
            Ok((self.config.model.num_recycle + 1, aatype.dim(0)?))
        } else {
            let (num_recycles, l) = aatype.dims2()?;
            Ok((num_recycles, l))
        }
    }

    /// Prepares raw features for [`predict`](Self::predict).
    pub fn process_features(&self, raw: RawFeatures, seed: u64) -> Result<FeatureDict> {
        Ok(features::process_features(
            raw,
            &self.config,
            seed,
            &self.device,
        )?)
    }

    /// Initializes parameters from one representative batch if none were
    /// supplied; no-op once they are set.
    pub fn init_params(&mut self, feat: &FeatureDict, seed: u64) -> Result<()> {
        if self.params.is_some() {
            return Ok(());
        }
        let (_, l) = self.loop_bounds(feat)?;
        let prev = PrevState::zeros(l, &self.device)?;
        let batch = Batch {
            features: feat,
            prev: &prev,
        };
        let params = self.network.init(seed, &batch)?;
        println!("WARNING: initialized parameters randomly; predictions will not be meaningful");
        self.params = Some(params);
        Ok(())
    }

    fn mean_score(&self, confidence: &ConfidenceMetrics, feat: &FeatureDict, r: usize) -> Result<f32> {
        match self.config.model.stop_at_score_ranker {
            ScoreRanker::Plddt => {
                let mask = feat.get("seq_mask")?;
                let mask = if self.multimer_mode() {
                    mask.clone()
                } else {
                    mask.get(r)?
                };
                let weighted = confidence.plddt.mul(&mask)?.sum_all()?.to_scalar::<f32>()?;
                let total = mask.sum_all()?.to_scalar::<f32>()?;
                Ok(weighted / total)
            }
            ScoreRanker::Ptm => match &confidence.pae {
                Some(pae) => Ok(pae.ptm),
                None => bail!("ranking by ptm requires an aligned-error head"),
            },
        }
    }

    /// Runs the recycling loop.
    ///
    /// Each iteration feeds the previous iteration's recurrent state back
    /// into the network, scores the result, and stops as soon as the ranking
    /// score exceeds `stop_at_score`; otherwise the budget is exhausted.
    /// Returns the last iteration's scored prediction and the zero-based
    /// index of that iteration. Any failure from slicing, the network call,
    /// or confidence computation aborts the whole prediction.
    pub fn predict(&mut self, feat: &mut FeatureDict, seed: u64) -> Result<(Prediction, usize)> {
        self.init_params(feat, seed)?;
        let (num_recycles, l) = self.loop_bounds(feat)?;
        if num_recycles == 0 {
            bail!("recycling budget is zero");
        }
        let Some(params) = self.params.as_ref() else {
            bail!("parameters unavailable after initialization");
        };

        let multimer = self.multimer_mode();
        let mut prev = PrevState::zeros(l, &self.device)?;
        // one fixed key, reused across all iterations
        let key = seed;
        let mut r = 0usize;
        let mut last: Option<Prediction> = None;

        while r < num_recycles {
            let (sub_feat, residue_index) = if multimer {
                feat.insert("iter", Tensor::new(r as u32, &self.device)?);
                (feat.clone(), feat.get("residue_index")?.clone())
            } else {
                let residue_index = feat.get("residue_index")?.get(0)?;
                (feat.slice_recycle(r)?, residue_index)
            };
            let batch = Batch {
                features: &sub_feat,
                prev: &prev,
            };
            let (output, _aux) = self.network.apply(params, key, &batch)?;
            let confidence = output.confidence_metrics(multimer, &residue_index)?;
            let mean_score = self.mean_score(&confidence, feat, r)?;
            prev = output.prev.clone();
            last = Some(Prediction {
                output,
                confidence,
                mean_score,
            });
            r += 1;
            if mean_score > self.config.model.stop_at_score {
                break;
            }
        }

        let Some(prediction) = last else {
            bail!("recycling loop produced no iterations");
        };
        Ok((prediction, r - 1))
    }
}
