//! refold-confidence
//!
//! Confidence metrics over the raw score distributions emitted by a
//! structure-prediction network:
//!
//! - per-residue pLDDT from binned lDDT logits
//! - expected aligned error and pTM/ipTM from the aligned-error head
//! - two interface-oriented scores (piTM and a contact-weighted interface
//!   score) computed over host arrays

mod bins;
mod interface;
mod tm;

pub use bins::{bin_centers, compute_plddt, expected_aligned_error};
pub use interface::{interface_score, predicted_interface_tm_score, InterfaceScore, PitmScore};
pub use tm::predicted_tm_score;

use candle_core::{Result, Tensor};

/// Borrowed view of an aligned-error head, as the network emits it.
pub struct AlignedErrorView<'a> {
    /// [L, L, bins]
    pub logits: &'a Tensor,
    /// [bins - 1]
    pub breaks: &'a Tensor,
    /// [L] asymmetric-unit id per residue; multimer predictions only.
    pub asym_id: Option<&'a Tensor>,
}

/// Metrics derived from the aligned-error head.
#[derive(Debug, Clone)]
pub struct PaeMetrics {
    /// Expected aligned error, [L, L].
    pub aligned_error: Tensor,
    /// Largest error representable by the binning.
    pub max_aligned_error: f32,
    pub ptm: f32,
    /// Interface-only pTM; multimer predictions only.
    pub iptm: Option<f32>,
    /// `0.8 * iptm + 0.2 * ptm`, the multimer ranking score.
    pub iptm_ptm: Option<f32>,
    pub pitm: PitmScore,
    pub interface: InterfaceScore,
}

#[derive(Debug, Clone)]
pub struct ConfidenceMetrics {
    /// Per-residue predicted lDDT in [0, 1].
    pub plddt: Tensor,
    /// Present only when the prediction carries an aligned-error head.
    pub pae: Option<PaeMetrics>,
}

/// Post-processes a prediction into confidence metrics.
///
/// `plddt` is always computed. The PAE-derived block is computed only when an
/// aligned-error head is present; `iptm` and the blended ranking score only in
/// multimer mode. The two interface scores copy their inputs to host memory
/// before looping, so the device tensors never enter the per-residue loops.
pub fn get_confidence_metrics(
    plddt_logits: &Tensor,
    aligned_error: Option<AlignedErrorView>,
    atom_positions: &Tensor,
    atom_mask: &Tensor,
    multimer_mode: bool,
    residue_index: &Tensor,
) -> Result<ConfidenceMetrics> {
    let plddt = compute_plddt(plddt_logits)?;
    let Some(head) = aligned_error else {
        return Ok(ConfidenceMetrics { plddt, pae: None });
    };

    let (aligned_error, max_aligned_error) = expected_aligned_error(head.logits, head.breaks)?;
    let ptm = predicted_tm_score(head.logits, head.breaks, None, false)?;
    let (iptm, iptm_ptm) = if multimer_mode {
        let iptm = predicted_tm_score(head.logits, head.breaks, head.asym_id, true)?;
        (Some(iptm), Some(0.8 * iptm + 0.2 * ptm))
    } else {
        (None, None)
    };

    println!("piTM score calculation step");
    let pitm = predicted_interface_tm_score(
        head.logits,
        head.breaks,
        residue_index,
        atom_positions,
        atom_mask,
    )?;
    println!("interface score calculation step");
    let interface = interface_score(
        head.logits,
        head.breaks,
        residue_index,
        atom_positions,
        atom_mask,
    )?;

    Ok(ConfidenceMetrics {
        plddt,
        pae: Some(PaeMetrics {
            aligned_error,
            max_aligned_error,
            ptm,
            iptm,
            iptm_ptm,
            pitm,
            interface,
        }),
    })
}
