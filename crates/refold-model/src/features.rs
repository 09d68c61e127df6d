//! Feature preparation.
//!
//! Raw inputs arrive in one of two shapes: a record-oriented
//! [`FeatureExample`], or an already-tabulated [`FeatureDict`]. Single-chain
//! assembly stacks one row per recycling iteration along the leading axis;
//! multimer features arrive fully assembled upstream and pass through.

use crate::config::RunConfig;
use candle_core::{DType, Device, Result, Tensor};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Named numeric feature arrays, keyed by field name.
#[derive(Debug, Clone, Default)]
pub struct FeatureDict(BTreeMap<String, Tensor>);

impl FeatureDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.0.insert(name.into(), tensor);
    }

    /// Fails with a named error when the field is absent.
    pub fn get(&self, name: &str) -> Result<&Tensor> {
        self.0
            .get(name)
            .ok_or_else(|| candle_core::Error::Msg(format!("feature '{name}' is missing")))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// One recycling iteration's worth of features: every array narrowed to
    /// row `r`, keeping a unit leading axis.
    pub fn slice_recycle(&self, r: usize) -> Result<FeatureDict> {
        let mut out = FeatureDict::new();
        for (name, tensor) in self.iter() {
            out.insert(name.clone(), tensor.narrow(0, r, 1)?);
        }
        Ok(out)
    }
}

impl From<BTreeMap<String, Tensor>> for FeatureDict {
    fn from(map: BTreeMap<String, Tensor>) -> Self {
        Self(map)
    }
}

/// Record-oriented raw input for a single chain.
#[derive(Debug, Clone)]
pub struct FeatureExample {
    pub aatype: Vec<u32>,
    pub residue_index: Vec<i64>,
    /// Defaults to all-ones when absent.
    pub seq_mask: Option<Vec<f32>>,
    /// MSA rows, query first; subsampled during assembly.
    pub msa: Option<Vec<Vec<u32>>>,
}

/// The two accepted raw-input representations.
pub enum RawFeatures {
    Example(FeatureExample),
    Arrays(FeatureDict),
}

/// Prepares raw features for the network. Multimer mode is pass-through;
/// single-chain mode assembles per-recycle stacks, with `seed` keying the MSA
/// subsampling.
pub fn process_features(
    raw: RawFeatures,
    config: &RunConfig,
    seed: u64,
    device: &Device,
) -> Result<FeatureDict> {
    if config.model.global_config.multimer_mode {
        return match raw {
            RawFeatures::Arrays(feat) => Ok(feat),
            RawFeatures::Example(_) => {
                candle_core::bail!("multimer features must arrive pre-assembled")
            }
        };
    }
    match raw {
        RawFeatures::Example(example) => example_to_features(&example, config, seed, device),
        RawFeatures::Arrays(feat) => arrays_to_features(feat, config, seed),
    }
}

fn tile(tensor: &Tensor, copies: usize) -> Result<Tensor> {
    let rows: Vec<Tensor> = std::iter::repeat(tensor.clone()).take(copies).collect();
    Tensor::stack(&rows, 0)
}

fn subsample_indices(total: usize, keep: usize, seed: u64) -> Vec<u32> {
    // row 0 is the query and is always kept
    let mut rest: Vec<u32> = (1..total as u32).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    rest.shuffle(&mut rng);
    rest.truncate(keep - 1);
    rest.sort_unstable();
    let mut rows = vec![0u32];
    rows.extend(rest);
    rows
}

fn subsample_msa(msa: &Tensor, max_rows: usize, seed: u64) -> Result<Tensor> {
    let rows = msa.dim(0)?;
    if rows <= max_rows || max_rows == 0 {
        return Ok(msa.clone());
    }
    let keep = subsample_indices(rows, max_rows, seed);
    let idx = Tensor::from_vec(keep, max_rows, msa.device())?;
    msa.index_select(&idx, 0)
}

/// Assembles a record-oriented example into the single-chain feature layout:
/// every field stacked to `num_recycle + 1` identical rows.
pub fn example_to_features(
    example: &FeatureExample,
    config: &RunConfig,
    seed: u64,
    device: &Device,
) -> Result<FeatureDict> {
    let l = example.aatype.len();
    if example.residue_index.len() != l {
        candle_core::bail!(
            "residue_index has {} entries for {} residues",
            example.residue_index.len(),
            l
        );
    }
    let recycles = config.model.num_recycle + 1;
    let mut feat = FeatureDict::new();

    let aatype = Tensor::from_vec(example.aatype.clone(), l, device)?;
    feat.insert("aatype", tile(&aatype, recycles)?);

    let residue_index = Tensor::from_vec(example.residue_index.clone(), l, device)?;
    feat.insert("residue_index", tile(&residue_index, recycles)?);

    let seq_mask = match &example.seq_mask {
        Some(mask) => {
            if mask.len() != l {
                candle_core::bail!("seq_mask has {} entries for {} residues", mask.len(), l);
            }
            Tensor::from_vec(mask.clone(), l, device)?
        }
        None => Tensor::ones(l, DType::F32, device)?,
    };
    feat.insert("seq_mask", tile(&seq_mask, recycles)?);

    if let Some(msa) = &example.msa {
        let rows = msa.len();
        let mut flat = Vec::with_capacity(rows * l);
        for row in msa {
            if row.len() != l {
                candle_core::bail!("msa row has {} entries for {} residues", row.len(), l);
            }
            flat.extend_from_slice(row);
        }
        let msa = Tensor::from_vec(flat, (rows, l), device)?;
        let msa = subsample_msa(&msa, config.model.max_msa_clusters, seed)?;
        feat.insert("msa", tile(&msa, recycles)?);
    }

    Ok(feat)
}

/// Normalizes an already-tabulated dict into the single-chain layout: arrays
/// whose leading axis is not the recycle axis are tiled, and an oversized MSA
/// is subsampled first.
pub fn arrays_to_features(feat: FeatureDict, config: &RunConfig, seed: u64) -> Result<FeatureDict> {
    for required in ["aatype", "residue_index", "seq_mask"] {
        if !feat.contains(required) {
            candle_core::bail!("feature '{required}' is missing");
        }
    }
    let recycles = config.model.num_recycle + 1;
    let mut out = FeatureDict::new();
    for (name, tensor) in feat.iter() {
        let mut tensor = tensor.clone();
        if name == "msa" {
            tensor = subsample_msa(&tensor, config.model.max_msa_clusters, seed)?;
        }
        let tensor = if tensor.dims().first() == Some(&recycles) {
            tensor
        } else {
            tile(&tensor, recycles)?
        };
        out.insert(name.clone(), tensor);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example(l: usize) -> FeatureExample {
        FeatureExample {
            aatype: vec![0; l],
            residue_index: (0..l as i64).collect(),
            seq_mask: None,
            msa: None,
        }
    }

    #[test]
    fn test_example_assembly_shapes() {
        let device = Device::Cpu;
        let config = RunConfig::default(); // num_recycle = 3
        let feat = example_to_features(&example(10), &config, 0, &device).unwrap();
        assert_eq!(feat.get("aatype").unwrap().dims(), &[4, 10]);
        assert_eq!(feat.get("residue_index").unwrap().dims(), &[4, 10]);
        assert_eq!(feat.get("seq_mask").unwrap().dims(), &[4, 10]);
    }

    #[test]
    fn test_msa_subsampling_keeps_query_row() {
        let device = Device::Cpu;
        let mut config = RunConfig::default();
        config.model.max_msa_clusters = 4;
        let mut ex = example(5);
        ex.msa = Some((0..10).map(|r| vec![r as u32; 5]).collect());
        let feat = example_to_features(&ex, &config, 7, &device).unwrap();
        let msa = feat.get("msa").unwrap();
        assert_eq!(msa.dims(), &[4, 4, 5]);
        let first_row = msa.get(0).unwrap().get(0).unwrap().to_vec1::<u32>().unwrap();
        assert_eq!(first_row, vec![0; 5]);
    }

    #[test]
    fn test_msa_subsampling_is_seed_deterministic() {
        let device = Device::Cpu;
        let mut config = RunConfig::default();
        config.model.max_msa_clusters = 3;
        let mut ex = example(4);
        ex.msa = Some((0..20).map(|r| vec![r as u32; 4]).collect());
        let a = example_to_features(&ex, &config, 11, &device).unwrap();
        let b = example_to_features(&ex, &config, 11, &device).unwrap();
        let rows_a = a.get("msa").unwrap().get(0).unwrap().to_vec2::<u32>().unwrap();
        let rows_b = b.get("msa").unwrap().get(0).unwrap().to_vec2::<u32>().unwrap();
        assert_eq!(rows_a, rows_b);
    }

    #[test]
    fn test_arrays_require_core_fields() {
        let config = RunConfig::default();
        let feat = FeatureDict::new();
        assert!(arrays_to_features(feat, &config, 0).is_err());
    }

    #[test]
    fn test_arrays_tile_unstacked_fields() {
        let device = Device::Cpu;
        let config = RunConfig::default();
        let mut feat = FeatureDict::new();
        feat.insert("aatype", Tensor::zeros(6, DType::U32, &device).unwrap());
        feat.insert("residue_index", Tensor::zeros(6, DType::I64, &device).unwrap());
        feat.insert("seq_mask", Tensor::ones(6, DType::F32, &device).unwrap());
        let out = arrays_to_features(feat, &config, 0).unwrap();
        assert_eq!(out.get("aatype").unwrap().dims(), &[4, 6]);
    }

    #[test]
    fn test_multimer_mode_passes_arrays_through() {
        let device = Device::Cpu;
        let mut config = RunConfig::default();
        config.model.global_config.multimer_mode = true;
        let mut feat = FeatureDict::new();
        feat.insert("aatype", Tensor::zeros(6, DType::U32, &device).unwrap());
        let out = process_features(RawFeatures::Arrays(feat), &config, 0, &device).unwrap();
        assert_eq!(out.get("aatype").unwrap().dims(), &[6]);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_slice_recycle_keeps_unit_axis() {
        let device = Device::Cpu;
        let config = RunConfig::default();
        let feat = example_to_features(&example(8), &config, 0, &device).unwrap();
        let slice = feat.slice_recycle(2).unwrap();
        assert_eq!(slice.get("aatype").unwrap().dims(), &[1, 8]);
    }
}
