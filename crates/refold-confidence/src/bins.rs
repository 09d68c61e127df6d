//! Binned-distribution helpers.
//!
//! Every confidence head emits logits over fixed bins; each metric starts by
//! turning those logits into expected values over the bin centers.

use candle_core::{Result, Tensor, D};
use candle_nn::ops::softmax;

/// Per-residue predicted lDDT-Ca in [0, 1] from logits of shape [L, bins].
pub fn compute_plddt(logits: &Tensor) -> Result<Tensor> {
    let num_bins = logits.dim(D::Minus1)?;
    let step = 1.0 / num_bins as f32;
    let centers: Vec<f32> = (0..num_bins)
        .map(|i| step / 2.0 + i as f32 * step)
        .collect();
    let centers = Tensor::from_vec(centers, num_bins, logits.device())?;
    let probs = softmax(logits, D::Minus1)?;
    probs.broadcast_mul(&centers)?.sum(D::Minus1)
}

/// Centers of the error bins described by `breaks`. The last bin is
/// open-ended and takes one extra step past the final break.
pub fn bin_centers(breaks: &Tensor) -> Result<Vec<f32>> {
    let breaks = breaks.flatten_all()?.to_vec1::<f32>()?;
    if breaks.is_empty() {
        candle_core::bail!("aligned-error breaks tensor is empty");
    }
    let step = if breaks.len() > 1 {
        breaks[1] - breaks[0]
    } else {
        breaks[0]
    };
    let mut centers: Vec<f32> = breaks.iter().map(|b| b + step / 2.0).collect();
    let last = centers[centers.len() - 1];
    centers.push(last + step);
    Ok(centers)
}

/// Expected aligned error [L, L] plus the largest representable error.
pub fn expected_aligned_error(logits: &Tensor, breaks: &Tensor) -> Result<(Tensor, f32)> {
    let centers = bin_centers(breaks)?;
    let max_error = centers[centers.len() - 1];
    let num_bins = centers.len();
    let centers = Tensor::from_vec(centers, num_bins, logits.device())?;
    let probs = softmax(logits, D::Minus1)?;
    let expected = probs.broadcast_mul(&centers)?.sum(D::Minus1)?;
    Ok((expected, max_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_plddt_of_peaked_logits_is_bin_center() {
        let device = Device::Cpu;
        // Strong peak on bin 35 of 50; its center is 0.71.
        let mut raw = vec![0f32; 50];
        raw[35] = 50.0;
        let logits = Tensor::from_vec(raw, (1, 50), &device).unwrap();
        let plddt = compute_plddt(&logits).unwrap().to_vec1::<f32>().unwrap();
        assert!((plddt[0] - 0.71).abs() < 1e-4);
    }

    #[test]
    fn test_plddt_bounded_by_unit_interval() {
        let device = Device::Cpu;
        let raw: Vec<f32> = (0..3 * 50).map(|i| ((i * 37) % 11) as f32 - 5.0).collect();
        let logits = Tensor::from_vec(raw, (3, 50), &device).unwrap();
        let plddt = compute_plddt(&logits).unwrap().to_vec1::<f32>().unwrap();
        for p in plddt {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_bin_centers_extend_past_last_break() {
        let device = Device::Cpu;
        let breaks = Tensor::from_vec(vec![0f32, 1.0, 2.0, 3.0], 4, &device).unwrap();
        let centers = bin_centers(&breaks).unwrap();
        assert_eq!(centers, vec![0.5, 1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_expected_error_of_peaked_logits() {
        let device = Device::Cpu;
        let mut raw = vec![0f32; 5];
        raw[2] = 50.0;
        let logits = Tensor::from_vec(raw, (1, 1, 5), &device).unwrap();
        let breaks = Tensor::from_vec(vec![0f32, 1.0, 2.0, 3.0], 4, &device).unwrap();
        let (expected, max_error) = expected_aligned_error(&logits, &breaks).unwrap();
        let value = expected.to_vec2::<f32>().unwrap()[0][0];
        assert!((value - 2.5).abs() < 1e-4);
        assert_eq!(max_error, 4.5);
    }
}
