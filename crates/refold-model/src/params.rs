//! Parameter mapping: network-layer name to named arrays.

use candle_core::{Device, Result, Tensor};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Nested parameter mapping, layer -> name -> array. Set once per
/// [`RunModel`](crate::RunModel) instance and never reassigned.
#[derive(Debug, Clone, Default)]
pub struct Params(BTreeMap<String, BTreeMap<String, Tensor>>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, layer: impl Into<String>, name: impl Into<String>, tensor: Tensor) {
        self.0
            .entry(layer.into())
            .or_default()
            .insert(name.into(), tensor);
    }

    /// Fails with a named error when the parameter is absent.
    pub fn get(&self, layer: &str, name: &str) -> Result<&Tensor> {
        self.0
            .get(layer)
            .and_then(|entries| entries.get(name))
            .ok_or_else(|| candle_core::Error::Msg(format!("parameter '{layer}/{name}' is missing")))
    }

    pub fn num_layers(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn layers(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Tensor>)> {
        self.0.iter()
    }

    /// Loads pretrained weights from a safetensors file. Keys follow the
    /// flat `layer/name` scheme, with the layer part allowed to contain
    /// further slashes.
    pub fn from_safetensors(path: impl AsRef<Path>, device: &Device) -> Result<Self> {
        let tensors = candle_core::safetensors::load(path, device)?;
        let mut params = Self::new();
        for (key, tensor) in tensors {
            let Some((layer, name)) = key.rsplit_once('/') else {
                candle_core::bail!("parameter key '{key}' is not of the form layer/name");
            };
            params.insert(layer, name, tensor);
        }
        Ok(params)
    }

    pub fn save_safetensors(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut flat: HashMap<String, Tensor> = HashMap::new();
        for (layer, entries) in &self.0 {
            for (name, tensor) in entries {
                flat.insert(format!("{layer}/{name}"), tensor.clone());
            }
        }
        candle_core::safetensors::save(&flat, path)
    }
}
