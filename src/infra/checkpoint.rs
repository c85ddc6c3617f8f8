// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores model weights with Burn's CompactRecorder
// and the model configuration as JSON next to them. Loading
// rebuilds the exact architecture from the stored config before
// the weights are poured back in — without the config, the
// record cannot be matched to a module tree.
//
// Files in the checkpoint directory:
//   model_<tag>.mpk.gz   ← weights for one saved tag
//   latest_tag.json      ← which tag was saved last
//   model_config.json    ← architecture hyperparameters

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use std::{fs, path::PathBuf};

use crate::ml::model::{RNetQaModel, RNetQaModelConfig};

pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Create a manager rooted at `dir`, creating it if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        fs::create_dir_all(&dir).ok();
        Self { dir }
    }

    /// Whether this directory holds a loadable checkpoint.
    pub fn has_checkpoint(&self) -> bool {
        self.dir.join("latest_tag.json").exists()
    }

    /// Save model weights under a tag and move the latest pointer.
    pub fn save_model<B: Backend>(&self, model: &RNetQaModel<B>, tag: &str) -> Result<()> {
        let path = self.dir.join(format!("model_{tag}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("failed to save checkpoint to '{}'", path.display()))?;

        let latest = self.dir.join("latest_tag.json");
        fs::write(&latest, serde_json::to_string(tag)?)
            .with_context(|| format!("failed to write '{}'", latest.display()))?;

        tracing::debug!("Saved checkpoint '{tag}'");
        Ok(())
    }

    /// Load the latest saved weights into a freshly built model.
    /// The model must match the architecture of the stored record.
    pub fn load_model<B: Backend>(
        &self,
        model: RNetQaModel<B>,
        device: &B::Device,
    ) -> Result<RNetQaModel<B>> {
        let tag = self.latest_tag()?;
        let path = self.dir.join(format!("model_{tag}"));

        tracing::info!("Loading checkpoint '{tag}'");
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    /// Store the architecture next to the weights.
    pub fn save_config(&self, config: &RNetQaModelConfig) -> Result<()> {
        let path = self.dir.join("model_config.json");
        fs::write(&path, serde_json::to_string_pretty(config)?)
            .with_context(|| format!("cannot write config to '{}'", path.display()))?;
        Ok(())
    }

    /// Read the stored architecture back.
    pub fn load_config(&self) -> Result<RNetQaModelConfig> {
        let path = self.dir.join("model_config.json");
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "cannot read config from '{}' — has a model been saved here?",
                path.display(),
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    fn latest_tag(&self) -> Result<String> {
        let path = self.dir.join("latest_tag.json");
        let raw = fs::read_to_string(&path).with_context(|| {
            format!("cannot find '{}' — no checkpoint saved yet", path.display())
        })?;
        Ok(serde_json::from_str(&raw)?)
    }
}
