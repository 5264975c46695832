//! Code generation configuration.
//!
//! Built explicitly with the bon builder, or read from environment variables.

use bon::bon;
use snafu::ensure;

use crate::error::{InvalidConfigSnafu, Result};

/// Whether the fused-IR path runs the fusion passes before emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
pub enum FusionMode {
    #[default]
    Enabled,
    /// Emit every node as written (`SIMDGEN_NOFUSE`).
    Disabled,
}

impl FusionMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenConfig {
    pub fusion: FusionMode,
    /// Log fusion statistics at info level after the passes run.
    pub report_stats: bool,
    /// Emit scalar loops for the elements left over after the last full vector.
    pub scalar_tail: bool,
    /// Emit prototypes for the math helpers the kernel references.
    pub helper_prototypes: bool,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self { fusion: FusionMode::Enabled, report_stats: false, scalar_tail: true, helper_prototypes: false }
    }
}

#[bon]
impl CodegenConfig {
    #[builder]
    pub fn builder(
        #[builder(default)] fusion: FusionMode,
        #[builder(default = false)] report_stats: bool,
        #[builder(default = true)] scalar_tail: bool,
        #[builder(default = false)] helper_prototypes: bool,
    ) -> Self {
        Self { fusion, report_stats, scalar_tail, helper_prototypes }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `SIMDGEN_NOFUSE` - Disable fusion
    /// * `SIMDGEN_FUSION_STATS` - Log fusion statistics
    /// * `SIMDGEN_NO_TAIL` - Skip scalar tail loops
    ///
    /// Flags accept `1`/`true`/`yes` (or an empty value) and `0`/`false`/`no`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Self::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let flag = |key: &str| -> Result<bool> {
            let Some(value) = lookup(key) else { return Ok(false) };
            let value = value.trim().to_ascii_lowercase();
            let on = matches!(value.as_str(), "" | "1" | "true" | "yes");
            ensure!(
                on || matches!(value.as_str(), "0" | "false" | "no"),
                InvalidConfigSnafu { reason: format!("{key}={value} is not a boolean flag") }
            );
            Ok(on)
        };

        Ok(Self {
            fusion: if flag("SIMDGEN_NOFUSE")? { FusionMode::Disabled } else { FusionMode::Enabled },
            report_stats: flag("SIMDGEN_FUSION_STATS")?,
            scalar_tail: !flag("SIMDGEN_NO_TAIL")?,
            helper_prototypes: false,
        })
    }
}
