//! Lowering configuration.

use kestrel_hir::{Instantiation, SingletonInit};
use serde::{Deserialize, Serialize};

/// When the shared instance of a non-capturing closure is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SingletonPolicy {
    /// On first evaluation of the site
    #[default]
    Lazy,
    /// At program start
    Eager,
}

impl SingletonPolicy {
    pub fn instantiation(self) -> Instantiation {
        match self {
            SingletonPolicy::Lazy => Instantiation::Singleton(SingletonInit::Lazy),
            SingletonPolicy::Eager => Instantiation::Singleton(SingletonInit::Eager),
        }
    }
}

/// Options for [`crate::convert_closures`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringOptions {
    pub singleton: SingletonPolicy,
    /// Lower independent top-level types on the rayon pool
    pub parallel: bool,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            singleton: SingletonPolicy::Lazy,
            parallel: true,
        }
    }
}

impl LoweringOptions {
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }
}
