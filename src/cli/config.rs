//! Conversion of command-line arguments into a `RemovalConfig`

use crate::cli::main_impl::{Cli, CliOutputMode};
use crate::{
    config::{ModelLoading, OutputMode, RemovalConfig},
    error::{BgRemovalError, Result},
    models::OutputInterpretation,
    utils::ExecutionProviderManager,
};

/// Builds the removal configuration from CLI arguments
pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Start from `--config` (or defaults) and apply every flag on top
    pub(crate) fn from_cli(cli: &Cli) -> Result<RemovalConfig> {
        let mut config = match cli.config {
            Some(ref path) => RemovalConfig::from_json_file(path)?,
            None => RemovalConfig::default(),
        };

        if let Some(ref model) = cli.model {
            config.model.path.clone_from(model);
        }
        if let Some(ref size) = cli.model_size {
            config.model.input_size = Self::parse_model_size(size)?;
        }
        if let Some(ref interpretation) = cli.interpretation {
            config.model.interpretation = Self::parse_interpretation(interpretation)?;
        }
        if let Some(ref backend) = cli.backend {
            let (backend_type, provider) = ExecutionProviderManager::parse_provider_string(backend)?;
            config.backend = backend_type;
            config.execution_provider = provider;
        }
        if let Some(mode) = cli.mode {
            config.output_mode = match mode {
                CliOutputMode::Cutout => OutputMode::Cutout,
                CliOutputMode::Mask => OutputMode::Mask,
            };
        }
        if let Some(ref dir) = cli.output_dir {
            config.scratch_dir = Some(dir.clone());
        }
        if cli.shared_model {
            config.model_loading = ModelLoading::Shared;
        }
        if cli.require_acceleration {
            config.require_acceleration = true;
        }
        if cli.threads > 0 {
            config.intra_threads = cli.threads;
            config.inter_threads = (cli.threads / 2).max(1);
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse `WIDTHxHEIGHT`
    pub(crate) fn parse_model_size(value: &str) -> Result<(u32, u32)> {
        let parsed = value
            .split_once(['x', 'X'])
            .and_then(|(w, h)| Some((w.trim().parse().ok()?, h.trim().parse().ok()?)));
        match parsed {
            Some((width, height)) if width > 0 && height > 0 => Ok((width, height)),
            _ => Err(BgRemovalError::config_value_error(
                "model size",
                value,
                "WIDTHxHEIGHT with positive integers",
            )),
        }
    }

    /// Parse `probability`, `logits`, `class-index:N` or `class-scores:N`
    pub(crate) fn parse_interpretation(value: &str) -> Result<OutputInterpretation> {
        let invalid = || {
            BgRemovalError::config_value_error(
                "interpretation",
                value,
                "probability, logits, class-index:N, class-scores:N",
            )
        };
        let (kind, background) = match value.split_once(':') {
            Some((kind, index)) => (kind, Some(index.parse::<u32>().map_err(|_| invalid())?)),
            None => (value, None),
        };

        match (kind.to_ascii_lowercase().as_str(), background) {
            ("probability", None) => Ok(OutputInterpretation::Probability),
            ("logits", None) => Ok(OutputInterpretation::Logits),
            ("class-index", background) => Ok(OutputInterpretation::ClassIndex {
                background: background.unwrap_or(0),
            }),
            ("class-scores", background) => Ok(OutputInterpretation::ClassScores {
                background: background.unwrap_or(0),
            }),
            _ => Err(invalid()),
        }
    }
}
