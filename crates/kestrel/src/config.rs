//! Project configuration: the optional `kestrel.toml` and its command-line overrides.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use kestrel_transform::{LoweringOptions, SingletonPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG: &str = "kestrel.toml";

/// Contents of `kestrel.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    pub lowering: LoweringOptions,
}

impl ProjectConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, or `kestrel.toml` in the working directory when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::from_toml(&text).with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("loaded {}: {:?}", path.display(), config.lowering);
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SingletonArg {
    Lazy,
    Eager,
}

impl From<SingletonArg> for SingletonPolicy {
    fn from(arg: SingletonArg) -> Self {
        match arg {
            SingletonArg::Lazy => SingletonPolicy::Lazy,
            SingletonArg::Eager => SingletonPolicy::Eager,
        }
    }
}

/// Lowering flags shared by `lower` and `run`
#[derive(Args, Debug, Default)]
pub struct LoweringFlags {
    /// Configuration file (defaults to ./kestrel.toml when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// When shared instances of non-capturing closures are created
    #[arg(long, value_enum)]
    pub singleton: Option<SingletonArg>,

    /// Lower top-level types one after another instead of in parallel
    #[arg(long)]
    pub sequential: bool,
}

impl LoweringFlags {
    /// Options from the config file with flags applied on top.
    pub fn resolve(&self) -> Result<LoweringOptions> {
        let config = ProjectConfig::load(self.config.as_deref())?;
        Ok(self.apply(config.lowering))
    }

    fn apply(&self, mut options: LoweringOptions) -> LoweringOptions {
        if let Some(singleton) = self.singleton {
            options.singleton = singleton.into();
        }
        if self.sequential {
            options.parallel = false;
        }
        options
    }
}
