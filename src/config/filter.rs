use crate::backend::BackendKind;
use crate::error::FilterError;
use crate::kernel::{BoundaryPolicy, Kernel, KernelPreset};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterToolConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Defaults to the machine's available parallelism.
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub boundary: BoundaryPolicy,
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub report_json: Option<PathBuf>,
}

impl FilterToolConfig {
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}

/// Either a named preset or explicit weights.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum KernelConfig {
    Preset { preset: KernelPreset },
    Custom { size: usize, weights: Vec<f32> },
}

impl Default for KernelConfig {
    fn default() -> Self {
        KernelConfig::Preset {
            preset: KernelPreset::BoxBlur,
        }
    }
}

impl KernelConfig {
    pub fn to_kernel(&self) -> Result<Kernel, FilterError> {
        match self {
            KernelConfig::Preset { preset } => Ok(preset.kernel()),
            KernelConfig::Custom { size, weights } => Kernel::new(*size, weights.clone()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<FilterToolConfig, FilterError> {
    let contents = fs::read_to_string(path).map_err(|e| {
        FilterError::InvalidConfiguration(format!("Failed to read config {}: {e}", path.display()))
    })?;
    parse_config(&contents).map_err(|e| match e {
        FilterError::InvalidConfiguration(msg) => {
            FilterError::InvalidConfiguration(format!("Failed to parse config {}: {msg}", path.display()))
        }
        other => other,
    })
}

pub fn parse_config(contents: &str) -> Result<FilterToolConfig, FilterError> {
    let config: FilterToolConfig = serde_json::from_str(contents)?;
    if config.workers == Some(0) {
        return Err(FilterError::InvalidConfiguration(
            "workers must be at least 1".to_string(),
        ));
    }
    config.kernel.to_kernel()?;
    Ok(config)
}
