use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use nnhost_contracts::MODEL_MANIFEST_SCHEMA_VERSION;

use crate::backend::{BackendTag, Device};

/// Path to a JSON manifest of registered models.
pub const ENV_MODELS_MANIFEST: &str = "NN_HOST_MODELS";
/// Inline `name:backend:device:path[,path...]` entries, `;`-separated.
pub const ENV_PRELOAD: &str = "NN_HOST_PRELOAD";

/// One registered named model: which backend owns it, the device it should
/// be loaded on, and the builder files that define it (in load order).
#[derive(Debug, Clone)]
pub struct RegisteredModel {
    pub tag: BackendTag,
    pub device: Device,
    pub builders: Vec<PathBuf>,
}

/// Immutable name → model map, fixed at environment construction. Consulted
/// by load-by-name on a cache miss to build on demand.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: BTreeMap<String, RegisteredModel>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelsManifest {
    schema_version: String,
    models: Vec<ManifestModel>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestModel {
    name: String,
    backend: String,
    #[serde(default)]
    device: Option<String>,
    builders: Vec<PathBuf>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredModel> {
        self.models.get(name)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// At most one entry per name; a duplicate is a configuration error.
    pub fn insert(&mut self, name: String, model: RegisteredModel) -> Result<()> {
        if self.models.contains_key(&name) {
            anyhow::bail!("duplicate model name {name:?}");
        }
        self.models.insert(name, model);
        Ok(())
    }

    /// Build the registry from the `NN_HOST_MODELS` manifest (if set) plus
    /// `NN_HOST_PRELOAD` inline entries (if set). Both sources share the
    /// one-entry-per-name rule.
    pub fn from_env() -> Result<ModelRegistry> {
        let mut registry = ModelRegistry::new();
        if let Ok(path) = std::env::var(ENV_MODELS_MANIFEST) {
            let path = Path::new(&path);
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read models manifest: {}", path.display()))?;
            registry
                .merge_manifest_str(&text)
                .with_context(|| format!("parse models manifest: {}", path.display()))?;
        }
        if let Ok(entries) = std::env::var(ENV_PRELOAD) {
            for entry in entries.split(';') {
                let entry = entry.trim();
                if entry.is_empty() {
                    continue;
                }
                let (name, model) = parse_preload_entry(entry)
                    .with_context(|| format!("parse {ENV_PRELOAD} entry {entry:?}"))?;
                registry.insert(name, model)?;
            }
        }
        Ok(registry)
    }

    pub fn from_manifest_path(path: &Path) -> Result<ModelRegistry> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read models manifest: {}", path.display()))?;
        let mut registry = ModelRegistry::new();
        registry
            .merge_manifest_str(&text)
            .with_context(|| format!("parse models manifest: {}", path.display()))?;
        Ok(registry)
    }

    fn merge_manifest_str(&mut self, text: &str) -> Result<()> {
        let manifest: ModelsManifest =
            serde_json::from_str(text).context("parse models manifest JSON")?;
        if manifest.schema_version != MODEL_MANIFEST_SCHEMA_VERSION {
            anyhow::bail!(
                "models manifest schema_version mismatch: expected {} got {}",
                MODEL_MANIFEST_SCHEMA_VERSION,
                manifest.schema_version
            );
        }
        for m in manifest.models {
            let tag: BackendTag = m
                .backend
                .parse()
                .with_context(|| format!("model {:?}", m.name))?;
            let device: Device = match &m.device {
                Some(d) => d.parse().with_context(|| format!("model {:?}", m.name))?,
                None => Device::Cpu,
            };
            if m.builders.is_empty() {
                anyhow::bail!("model {:?} has no builders", m.name);
            }
            self.insert(
                m.name,
                RegisteredModel {
                    tag,
                    device,
                    builders: m.builders,
                },
            )?;
        }
        Ok(())
    }
}

/// The inline registration form: `name:backend:device:path[,path...]`.
fn parse_preload_entry(entry: &str) -> Result<(String, RegisteredModel)> {
    let mut parts = entry.splitn(4, ':');
    let (name, backend, device, paths) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(n), Some(b), Some(d), Some(p)) => (n, b, d, p),
        _ => anyhow::bail!("expected name:backend:device:path"),
    };
    if name.is_empty() {
        anyhow::bail!("empty model name");
    }
    let tag: BackendTag = backend.parse()?;
    let device: Device = device.parse()?;
    let builders: Vec<PathBuf> = paths
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect();
    if builders.is_empty() {
        anyhow::bail!("no builder paths");
    }
    Ok((
        name.to_string(),
        RegisteredModel {
            tag,
            device,
            builders,
        },
    ))
}
