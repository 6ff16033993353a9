//! Numbered JSON checkpoints
//!
//! Level 4 - File I/O
//!
//! A checkpoint directory holds `checkpoint-000001.json`,
//! `checkpoint-000002.json`, ... each with the weights of every policy and
//! the settings of the run that produced it.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use pbt_core::{PolicyId, PolicyWeights, WeightMap};
use serde::{Deserialize, Serialize};

const PREFIX: &str = "checkpoint-";
const EXTENSION: &str = "json";

/// Contents of one checkpoint file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub number: u32,
    pub created_at: DateTime<Utc>,
    pub mode: String,
    pub timesteps_total: u64,
    /// Settings of the run, kept verbatim
    pub metadata: serde_json::Value,
    pub weights: WeightMap,
}

impl Checkpoint {
    /// Weights of one policy
    pub fn policy(&self, name: &str) -> Result<&PolicyWeights> {
        self.weights.get(name).with_context(|| {
            let known: Vec<&str> = self.weights.keys().map(PolicyId::as_str).collect();
            format!("No policy named {} in checkpoint (has: {})", name, known.join(", "))
        })
    }
}

/// Directory of numbered checkpoints
#[derive(Clone, Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    next_number: u32,
}

impl CheckpointStore {
    /// Open (and create) a checkpoint directory, continuing its numbering
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create checkpoint directory {}", dir.display()))?;
        let next_number = list_numbered(&dir)?
            .last()
            .map_or(1, |(number, _)| number + 1);
        Ok(Self { dir, next_number })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write the next checkpoint and return its path
    pub fn save(
        &mut self,
        weights: WeightMap,
        mode: &str,
        timesteps_total: u64,
        metadata: &serde_json::Value,
    ) -> Result<PathBuf> {
        let checkpoint = Checkpoint {
            number: self.next_number,
            created_at: Utc::now(),
            mode: mode.to_string(),
            timesteps_total,
            metadata: metadata.clone(),
            weights,
        };
        let path = self.dir.join(file_name(checkpoint.number));
        let json = serde_json::to_string_pretty(&checkpoint)?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write checkpoint {}", path.display()))?;

        self.next_number += 1;
        tracing::info!("Checkpoint saved: {} ({} timesteps)", path.display(), timesteps_total);
        Ok(path)
    }

    /// Checkpoint files in order of their number
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        Ok(list_numbered(&self.dir)?.into_iter().map(|(_, p)| p).collect())
    }

    /// Newest checkpoint file, if any
    pub fn latest(&self) -> Result<Option<PathBuf>> {
        Ok(self.list()?.pop())
    }

    /// Read a checkpoint file
    pub fn load(path: &Path) -> Result<Checkpoint> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checkpoint {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Invalid checkpoint {}", path.display()))
    }
}

/// Resolve a checkpoint file, or the newest checkpoint of a directory
pub fn resolve_checkpoint(path: &Path) -> Result<PathBuf> {
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if !path.is_dir() {
        bail!("Checkpoint path does not exist: {}", path.display());
    }
    match CheckpointStore::new(path)?.latest()? {
        Some(latest) => Ok(latest),
        None => bail!("No checkpoints in {}", path.display()),
    }
}

fn file_name(number: u32) -> String {
    format!("{}{:06}.{}", PREFIX, number, EXTENSION)
}

fn parse_number(path: &Path) -> Option<u32> {
    if path.extension()? != EXTENSION {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(PREFIX)?
        .parse()
        .ok()
}

fn list_numbered(dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read checkpoint directory {}", dir.display()))?
    {
        let path = entry?.path();
        if let Some(number) = parse_number(&path) {
            found.push((number, path));
        }
    }
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pbt-ckpt-{}-{}", name, std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        dir
    }

    fn weights(value: f32) -> WeightMap {
        let mut map = WeightMap::new();
        map.insert(PolicyId::main(), PolicyWeights::new(vec![value; 3]));
        map
    }

    #[test]
    fn test_file_name_roundtrip() {
        let name = file_name(12);
        assert_eq!(name, "checkpoint-000012.json");
        assert_eq!(parse_number(Path::new(&name)), Some(12));
        assert_eq!(parse_number(Path::new("notes.json")), None);
        assert_eq!(parse_number(Path::new("checkpoint-000001.txt")), None);
    }

    #[test]
    fn test_save_list_latest() {
        let dir = temp_dir("save");
        let mut store = CheckpointStore::new(&dir).unwrap();
        assert!(store.latest().unwrap().is_none());

        store.save(weights(1.0), "pbt", 100, &serde_json::json!({})).unwrap();
        let second = store.save(weights(2.0), "pbt", 200, &serde_json::json!({})).unwrap();

        assert_eq!(store.list().unwrap().len(), 2);
        assert_eq!(store.latest().unwrap(), Some(second.clone()));

        let loaded = CheckpointStore::load(&second).unwrap();
        assert_eq!(loaded.number, 2);
        assert_eq!(loaded.timesteps_total, 200);
        assert_eq!(loaded.policy("main").unwrap().values, vec![2.0; 3]);
        assert!(loaded.policy("victim").is_err());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_reopen_continues_numbering() {
        let dir = temp_dir("reopen");
        let mut store = CheckpointStore::new(&dir).unwrap();
        store.save(weights(1.0), "selfplay", 10, &serde_json::Value::Null).unwrap();

        let mut reopened = CheckpointStore::new(&dir).unwrap();
        let path = reopened.save(weights(1.0), "selfplay", 20, &serde_json::Value::Null).unwrap();
        assert!(path.ends_with("checkpoint-000002.json"));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_resolve_checkpoint() {
        let dir = temp_dir("resolve");
        assert!(resolve_checkpoint(&dir).is_err());

        let mut store = CheckpointStore::new(&dir).unwrap();
        assert!(resolve_checkpoint(&dir).is_err());

        let first = store.save(weights(1.0), "attack", 5, &serde_json::Value::Null).unwrap();
        let second = store.save(weights(1.0), "attack", 6, &serde_json::Value::Null).unwrap();
        assert_eq!(resolve_checkpoint(&dir).unwrap(), second);
        assert_eq!(resolve_checkpoint(&first).unwrap(), first);

        std::fs::remove_dir_all(&dir).ok();
    }
}
