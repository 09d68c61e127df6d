//! Interface-oriented scores.
//!
//! Both routines loop residue-by-residue over inter-chain contacts, so they
//! copy their inputs into host vectors up front instead of indexing device
//! tensors inside the loops.

use crate::bins::{bin_centers, expected_aligned_error};
use crate::tm::{expected_tm_term, tm_d0};
use candle_core::{DType, Result, Tensor};
use itertools::iproduct;
use std::collections::BTreeSet;

/// Inter-chain distance below which two residues count as in contact.
const CONTACT_CUTOFF: f32 = 8.0;

#[derive(Debug, Clone, Copy)]
pub struct PitmScore {
    pub score: f32,
    pub num_interface_residues: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct InterfaceScore {
    pub score: f32,
    pub num_contacts: usize,
}

/// Chain assignment from a residue-index vector: an index restart or a jump
/// larger than 32 starts a new chain.
pub(crate) fn assign_chains(residue_index: &[i64]) -> Vec<usize> {
    let mut chains = Vec::with_capacity(residue_index.len());
    let mut chain = 0usize;
    for (pos, &idx) in residue_index.iter().enumerate() {
        if pos > 0 {
            let prev = residue_index[pos - 1];
            if idx <= prev || idx - prev > 32 {
                chain += 1;
            }
        }
        chains.push(chain);
    }
    chains
}

struct HostArrays {
    num_res: usize,
    num_atoms: usize,
    positions: Vec<f32>,
    mask: Vec<f32>,
    chains: Vec<usize>,
}

fn to_host(
    residue_index: &Tensor,
    atom_positions: &Tensor,
    atom_mask: &Tensor,
    num_res: usize,
) -> Result<HostArrays> {
    let res_index = residue_index
        .flatten_all()?
        .to_dtype(DType::I64)?
        .to_vec1::<i64>()?;
    if res_index.len() != num_res {
        candle_core::bail!(
            "residue_index has {} entries for {} residues",
            res_index.len(),
            num_res
        );
    }
    let (pos_res, num_atoms, _) = atom_positions.dims3()?;
    if pos_res != num_res {
        candle_core::bail!("atom_positions cover {} residues, expected {}", pos_res, num_res);
    }
    Ok(HostArrays {
        num_res,
        num_atoms,
        positions: atom_positions.flatten_all()?.to_vec1::<f32>()?,
        mask: atom_mask.flatten_all()?.to_vec1::<f32>()?,
        chains: assign_chains(&res_index),
    })
}

impl HostArrays {
    fn min_residue_distance(&self, i: usize, j: usize) -> Option<f32> {
        let mut best: Option<f32> = None;
        for (a, b) in iproduct!(0..self.num_atoms, 0..self.num_atoms) {
            if self.mask[i * self.num_atoms + a] < 0.5 || self.mask[j * self.num_atoms + b] < 0.5
            {
                continue;
            }
            let pi = &self.positions[(i * self.num_atoms + a) * 3..][..3];
            let pj = &self.positions[(j * self.num_atoms + b) * 3..][..3];
            let d = ((pi[0] - pj[0]).powi(2) + (pi[1] - pj[1]).powi(2) + (pi[2] - pj[2]).powi(2))
                .sqrt();
            best = Some(best.map_or(d, |x: f32| x.min(d)));
        }
        best
    }

    /// Symmetric list of residue pairs from different chains within the
    /// contact cutoff, each pair reported once with i < j.
    fn inter_chain_contacts(&self) -> Vec<(usize, usize)> {
        let mut contacts = Vec::new();
        for (i, j) in iproduct!(0..self.num_res, 0..self.num_res) {
            if i >= j || self.chains[i] == self.chains[j] {
                continue;
            }
            if let Some(d) = self.min_residue_distance(i, j) {
                if d < CONTACT_CUTOFF {
                    contacts.push((i, j));
                }
            }
        }
        contacts
    }
}

/// Predicted interface TM-score (piTM): the TM-score restricted to residues
/// with at least one inter-chain contact, normalized by the interface size.
pub fn predicted_interface_tm_score(
    logits: &Tensor,
    breaks: &Tensor,
    residue_index: &Tensor,
    atom_positions: &Tensor,
    atom_mask: &Tensor,
) -> Result<PitmScore> {
    let (num_res, _, _) = logits.dims3()?;
    let host = to_host(residue_index, atom_positions, atom_mask, num_res)?;
    let contacts = host.inter_chain_contacts();

    let mut interface: BTreeSet<usize> = BTreeSet::new();
    for &(i, j) in &contacts {
        interface.insert(i);
        interface.insert(j);
    }
    if interface.is_empty() {
        return Ok(PitmScore {
            score: 0.0,
            num_interface_residues: 0,
        });
    }

    // d0 is sized by the interface, not the full complex.
    let tm_term = expected_tm_term(logits, breaks, tm_d0(interface.len()))?;
    let mut best = 0f32;
    for &i in &interface {
        let mut pairs = 0f32;
        let mut score = 0f32;
        for &j in &interface {
            if host.chains[i] == host.chains[j] {
                continue;
            }
            pairs += 1.0;
            score += tm_term[i][j];
        }
        if pairs > 0.0 {
            best = best.max(score / pairs);
        }
    }
    Ok(PitmScore {
        score: best,
        num_interface_residues: interface.len(),
    })
}

/// Contact-weighted interface reliability: each inter-chain contact
/// contributes the complement of its normalized expected aligned error,
/// averaged over all contacts.
pub fn interface_score(
    logits: &Tensor,
    breaks: &Tensor,
    residue_index: &Tensor,
    atom_positions: &Tensor,
    atom_mask: &Tensor,
) -> Result<InterfaceScore> {
    let (num_res, _, _) = logits.dims3()?;
    let host = to_host(residue_index, atom_positions, atom_mask, num_res)?;
    let contacts = host.inter_chain_contacts();
    if contacts.is_empty() {
        return Ok(InterfaceScore {
            score: 0.0,
            num_contacts: 0,
        });
    }

    let centers = bin_centers(breaks)?;
    let max_error = centers[centers.len() - 1];
    let (expected, _) = expected_aligned_error(logits, breaks)?;
    let pae = expected.to_vec2::<f32>()?;

    let mut total = 0f32;
    for &(i, j) in &contacts {
        let err = 0.5 * (pae[i][j] + pae[j][i]);
        total += 1.0 - (err / max_error).min(1.0);
    }
    Ok(InterfaceScore {
        score: total / contacts.len() as f32,
        num_contacts: contacts.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    #[test]
    fn test_chain_breaks_on_restart_and_gap() {
        assert_eq!(assign_chains(&[0, 1, 2, 0, 1]), vec![0, 0, 0, 1, 1]);
        assert_eq!(assign_chains(&[0, 1, 50, 51]), vec![0, 0, 1, 1]);
        assert_eq!(assign_chains(&[0, 1, 5, 6]), vec![0, 0, 0, 0]);
    }

    fn synthetic_pair(device: &Device, separation: f32) -> (Tensor, Tensor, Tensor) {
        // Two single-residue chains `separation` apart, one atom each.
        let mut positions = vec![0f32; 2 * 37 * 3];
        positions[37 * 3] = separation;
        let mut mask = vec![0f32; 2 * 37];
        mask[0] = 1.0;
        mask[37] = 1.0;
        let positions = Tensor::from_vec(positions, (2, 37, 3), device).unwrap();
        let mask = Tensor::from_vec(mask, (2, 37), device).unwrap();
        let residue_index = Tensor::from_vec(vec![0i64, 0], 2, device).unwrap();
        (positions, mask, residue_index)
    }

    #[test]
    fn test_no_contacts_when_chains_are_far_apart() {
        let device = Device::Cpu;
        let (positions, mask, residue_index) = synthetic_pair(&device, 50.0);
        let logits = Tensor::zeros((2, 2, 5), DType::F32, &device).unwrap();
        let breaks = Tensor::from_vec(vec![0f32, 4.0, 8.0, 12.0], 4, &device).unwrap();
        let pitm =
            predicted_interface_tm_score(&logits, &breaks, &residue_index, &positions, &mask)
                .unwrap();
        assert_eq!(pitm.num_interface_residues, 0);
        assert_eq!(pitm.score, 0.0);
        let iface = interface_score(&logits, &breaks, &residue_index, &positions, &mask).unwrap();
        assert_eq!(iface.num_contacts, 0);
    }

    #[test]
    fn test_confident_contact_scores_high() {
        let device = Device::Cpu;
        let (positions, mask, residue_index) = synthetic_pair(&device, 4.0);
        // Peak all pairs on the lowest error bin.
        let mut raw = vec![0f32; 2 * 2 * 5];
        for pair in 0..4 {
            raw[pair * 5] = 50.0;
        }
        let logits = Tensor::from_vec(raw, (2, 2, 5), &device).unwrap();
        let breaks = Tensor::from_vec(vec![0f32, 0.25, 0.5, 0.75], 4, &device).unwrap();
        let iface = interface_score(&logits, &breaks, &residue_index, &positions, &mask).unwrap();
        assert_eq!(iface.num_contacts, 1);
        assert!(iface.score > 0.8);
        let pitm =
            predicted_interface_tm_score(&logits, &breaks, &residue_index, &positions, &mask)
                .unwrap();
        assert_eq!(pitm.num_interface_residues, 2);
        assert!(pitm.score > 0.5);
    }
}
