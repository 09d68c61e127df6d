//! Predicted TM-score from the aligned-error head.

use crate::bins::bin_centers;
use candle_core::{DType, Result, Tensor, D};
use candle_nn::ops::softmax;

/// TM-score normalization constant for `num_res` residues.
pub(crate) fn tm_d0(num_res: usize) -> f32 {
    let clipped = num_res.max(19) as f32;
    1.24 * (clipped - 15.0).cbrt() - 1.8
}

/// Expected per-pair TM term [L][L]: sum over bins of p(bin) / (1 + (d/d0)^2).
pub(crate) fn expected_tm_term(
    logits: &Tensor,
    breaks: &Tensor,
    d0: f32,
) -> Result<Vec<Vec<f32>>> {
    let centers = bin_centers(breaks)?;
    let kernel: Vec<f32> = centers
        .iter()
        .map(|c| 1.0 / (1.0 + (c / d0).powi(2)))
        .collect();
    let num_bins = kernel.len();
    let kernel = Tensor::from_vec(kernel, num_bins, logits.device())?;
    let probs = softmax(logits, D::Minus1)?;
    probs.broadcast_mul(&kernel)?.sum(D::Minus1)?.to_vec2::<f32>()
}

/// Predicted TM-score over all residue pairs.
///
/// With `interface` set, only pairs spanning two asymmetric units contribute
/// (ipTM); `asym_id` is required in that case. The score is the best
/// mask-normalized alignment over residues.
pub fn predicted_tm_score(
    logits: &Tensor,
    breaks: &Tensor,
    asym_id: Option<&Tensor>,
    interface: bool,
) -> Result<f32> {
    let (num_res, _, _) = logits.dims3()?;
    let tm_term = expected_tm_term(logits, breaks, tm_d0(num_res))?;
    let asym: Option<Vec<f32>> = match asym_id {
        Some(ids) => Some(ids.flatten_all()?.to_dtype(DType::F32)?.to_vec1::<f32>()?),
        None => None,
    };
    if interface && asym.is_none() {
        candle_core::bail!("interface TM-score requested without asym_id");
    }

    let mut best = 0f32;
    for i in 0..num_res {
        let mut pairs = 0f32;
        let mut score = 0f32;
        for j in 0..num_res {
            let included = match &asym {
                Some(ids) if interface => ids[i] != ids[j],
                _ => true,
            };
            if included {
                pairs += 1.0;
                score += tm_term[i][j];
            }
        }
        if pairs > 0.0 {
            best = best.max(score / pairs);
        }
    }
    Ok(best)
}
