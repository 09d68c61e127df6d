//! The network boundary.
//!
//! The runner treats the network as a pure function
//! `(params, key, batch) -> (output, aux)` behind the [`FoldNetwork`] trait;
//! nothing in this crate looks inside it.

use crate::features::FeatureDict;
use crate::params::Params;
use candle_core::{DType, Device, Result, Tensor};
use refold_confidence::{AlignedErrorView, ConfidenceMetrics};
use std::collections::BTreeMap;

/// Recurrent belief state threaded between recycling iterations.
#[derive(Debug, Clone)]
pub struct PrevState {
    /// [L, 256]
    pub msa_first_row: Tensor,
    /// [L, L, 128]
    pub pair: Tensor,
    /// [L, 37, 3]
    pub pos: Tensor,
}

impl PrevState {
    pub const MSA_CHANNELS: usize = 256;
    pub const PAIR_CHANNELS: usize = 128;
    pub const NUM_ATOMS: usize = 37;

    /// Zeroed state for a sequence of length `l`.
    pub fn zeros(l: usize, device: &Device) -> Result<Self> {
        Ok(Self {
            msa_first_row: Tensor::zeros((l, Self::MSA_CHANNELS), DType::F32, device)?,
            pair: Tensor::zeros((l, l, Self::PAIR_CHANNELS), DType::F32, device)?,
            pos: Tensor::zeros((l, Self::NUM_ATOMS, 3), DType::F32, device)?,
        })
    }
}

/// Aligned-error head output.
#[derive(Debug, Clone)]
pub struct AlignedError {
    /// [L, L, bins]
    pub logits: Tensor,
    /// [bins - 1]
    pub breaks: Tensor,
    /// [L] asymmetric-unit id per residue; multimer predictions only.
    pub asym_id: Option<Tensor>,
}

/// Raw network result for one recycling iteration.
///
/// Tensors are unbatched: the leading axis is the residue dimension.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// [L, 50]
    pub predicted_lddt_logits: Tensor,
    pub aligned_error: Option<AlignedError>,
    /// [L, 37, 3]
    pub final_atom_positions: Tensor,
    /// [L, 37]
    pub final_atom_mask: Tensor,
    /// Next iteration's recurrent state.
    pub prev: PrevState,
    /// Extra heads, passed through untouched.
    pub extra: BTreeMap<String, Tensor>,
}

impl ModelOutput {
    /// Confidence metrics over this output.
    pub fn confidence_metrics(
        &self,
        multimer_mode: bool,
        residue_index: &Tensor,
    ) -> Result<ConfidenceMetrics> {
        let head = self.aligned_error.as_ref().map(|h| AlignedErrorView {
            logits: &h.logits,
            breaks: &h.breaks,
            asym_id: h.asym_id.as_ref(),
        });
        refold_confidence::get_confidence_metrics(
            &self.predicted_lddt_logits,
            head,
            &self.final_atom_positions,
            &self.final_atom_mask,
            multimer_mode,
            residue_index,
        )
    }
}

/// Secondary network output; the runner discards it.
pub type Aux = BTreeMap<String, Tensor>;

/// Per-iteration network input: a feature slice plus the injected recurrent
/// state.
pub struct Batch<'a> {
    pub features: &'a FeatureDict,
    pub prev: &'a PrevState,
}

/// The opaque network evaluator.
pub trait FoldNetwork {
    /// Builds a parameter mapping from one representative batch.
    fn init(&self, seed: u64, batch: &Batch) -> Result<Params>;
    /// Evaluates the network. `key` is the pseudo-random key for the call;
    /// the runner reuses one fixed key across all recycling iterations.
    fn apply(&self, params: &Params, key: u64, batch: &Batch) -> Result<(ModelOutput, Aux)>;
}
