//! Background removal CLI tool
//!
//! Writes one PNG per input into the output directory and prints its path.
//! Failures print as `<Kind>: <message>` on stderr; the exit status is
//! non-zero if any input failed.

use super::config::CliConfigBuilder;
use crate::{
    environment::{EnvironmentProbe, RuntimeProbe},
    error::BgRemovalError,
    processor::BackgroundRemover,
    tracing_config::init_cli_tracing,
    types::RemovalOutput,
    utils::ExecutionProviderManager,
};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Remove image backgrounds with a segmentation model
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-mask")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image paths or file:// URIs
    #[arg(value_name = "INPUT", required_unless_present = "show_environment")]
    pub input: Vec<String>,

    /// Path to the ONNX segmentation model
    #[arg(short, long, value_name = "PATH")]
    pub model: Option<PathBuf>,

    /// Model input size as WIDTHxHEIGHT (e.g. 1024x1024)
    #[arg(long, value_name = "WxH")]
    pub model_size: Option<String>,

    /// How to read the model output: probability, logits, class-index:N, class-scores:N
    #[arg(long, value_name = "KIND")]
    pub interpretation: Option<String>,

    /// Backend and execution provider (onnx:auto, onnx:cpu, onnx:cuda, onnx:coreml, tract:cpu, mock)
    #[arg(short, long, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Output content
    #[arg(long, value_enum)]
    pub mode: Option<CliOutputMode>,

    /// Directory for the PNG outputs [default: system temp directory]
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Load the model once and reuse it for every input
    #[arg(long)]
    pub shared_model: bool,

    /// Fail instead of falling back to CPU when the requested accelerator is missing
    #[arg(long)]
    pub require_acceleration: bool,

    /// Number of inference threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// JSON configuration file; command-line flags override its values
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the execution environment and provider availability, then exit
    #[arg(long)]
    pub show_environment: bool,

    /// Verbose logging (-v: INFO, -vv: DEBUG, -vvv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliOutputMode {
    /// Source pixels with the mask as alpha
    Cutout,
    /// Single-channel mask
    Mask,
}

pub async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let config = match CliConfigBuilder::from_cli(&cli) {
        Ok(config) => config,
        Err(e) => return Ok(report_failure(&e)),
    };
    debug!(?config, "configuration resolved");

    if cli.show_environment {
        show_environment(&config)?;
        return Ok(ExitCode::SUCCESS);
    }

    let remover = match BackgroundRemover::new(config) {
        Ok(remover) => Arc::new(remover),
        Err(e) => return Ok(report_failure(&e)),
    };
    info!(
        inputs = cli.input.len(),
        output_dir = %remover.scratch_dir().display(),
        "starting background removal"
    );

    let mut failures = 0usize;
    for (input, result) in process_inputs(&remover, &cli.input).await {
        match result {
            Ok(output) => {
                println!("{}", output.path.display());
                debug!(
                    input = %input,
                    total_ms = output.timings.total_ms,
                    inference_ms = output.timings.inference_ms,
                    "input processed"
                );
            },
            Err(e) => {
                report_failure(&e);
                failures += 1;
            },
        }
    }

    if failures > 0 {
        info!(failures, total = cli.input.len(), "some inputs failed");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Process inputs in order
///
/// An input whose output path was already written earlier in the batch fails
/// with `WriteFailed` instead of replacing that output.
pub(crate) async fn process_inputs<'a>(
    remover: &Arc<BackgroundRemover>,
    inputs: &'a [String],
) -> Vec<(&'a str, crate::Result<RemovalOutput>)> {
    let mut written: HashMap<PathBuf, &str> = HashMap::new();
    let mut outcomes = Vec::with_capacity(inputs.len());

    for input in inputs {
        let planned = remover.output_path(input).ok();
        if let Some(earlier) = planned.as_ref().and_then(|path| written.get(path)) {
            let e = BgRemovalError::write_failed(format!(
                "output for '{input}' would replace the output of '{earlier}'"
            ));
            warn!(kind = %e.kind(), error = %e, "skipping input");
            outcomes.push((input.as_str(), Err(e)));
            continue;
        }

        let result = Arc::clone(remover).remove_background(input.as_str()).await;
        if let (Ok(_), Some(path)) = (&result, planned) {
            written.insert(path, input.as_str());
        }
        outcomes.push((input.as_str(), result));
    }
    outcomes
}

fn report_failure(error: &BgRemovalError) -> ExitCode {
    eprintln!("{}: {}", error.kind(), error.message());
    ExitCode::FAILURE
}

fn show_environment(config: &crate::config::RemovalConfig) -> Result<()> {
    let environment = RuntimeProbe.probe(config);

    println!("Execution providers:");
    for provider in ExecutionProviderManager::list_all_providers() {
        let status = if provider.available { "available" } else { "unavailable" };
        println!("  {:<12} {:<12} {}", provider.name, status, provider.description);
    }
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&environment).context("Failed to serialize environment")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockBackend, MockBackendFactory};
    use crate::config::{BackendType, OutputMode, RemovalConfig};
    use crate::environment::StaticProbe;
    use crate::error::ErrorKind;
    use tempfile::TempDir;

    fn mock_remover(dir: &TempDir, factory: &MockBackendFactory) -> Arc<BackgroundRemover> {
        let model = dir.path().join("mock.onnx");
        std::fs::write(&model, b"mock model").unwrap();
        let mut config = RemovalConfig::builder()
            .backend(BackendType::Mock)
            .model_path(model)
            .output_mode(OutputMode::Mask)
            .scratch_dir(dir.path().join("out"))
            .build()
            .unwrap();
        config.model.input_size = (16, 16);
        Arc::new(
            BackgroundRemover::with_components(
                config,
                Arc::new(factory.clone()),
                &StaticProbe::supported(),
            )
            .unwrap(),
        )
    }

    fn write_image(dir: &TempDir, name: &str, width: u32, height: u32) -> String {
        let path = dir.path().join(name);
        image::RgbImage::new(width, height).save(&path).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_same_stem_inputs_keep_first_output() {
        let dir = TempDir::new().unwrap();
        let factory = MockBackendFactory::new(MockBackend::new());
        let remover = mock_remover(&dir, &factory);
        let inputs = vec![
            write_image(&dir, "shot.jpg", 30, 10),
            write_image(&dir, "shot.png", 8, 8),
            write_image(&dir, "other.png", 5, 5),
        ];

        let outcomes = process_inputs(&remover, &inputs).await;
        assert_eq!(outcomes.len(), 3);

        let first = outcomes[0].1.as_ref().unwrap();
        assert!(first.path.ends_with("shot.png"));

        let err = outcomes[1].1.as_ref().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WriteFailed);
        assert!(err.message().contains("shot.jpg"));

        assert!(outcomes[2].1.is_ok());
        assert_eq!(factory.inference_calls(), 2);

        let written = image::open(&first.path).unwrap();
        assert_eq!((written.width(), written.height()), (30, 10));
    }

    #[tokio::test]
    async fn test_failed_input_does_not_claim_its_output() {
        let dir = TempDir::new().unwrap();
        let factory = MockBackendFactory::new(MockBackend::new());
        let remover = mock_remover(&dir, &factory);
        let missing = dir.path().join("shot.jpg").to_string_lossy().into_owned();
        let inputs = vec![missing, write_image(&dir, "shot.png", 8, 8)];

        let outcomes = process_inputs(&remover, &inputs).await;
        assert_eq!(
            outcomes[0].1.as_ref().unwrap_err().kind(),
            ErrorKind::InvalidSource
        );
        assert!(outcomes[1].1.is_ok());
    }

    #[test]
    fn test_inputs_required_without_show_environment() {
        assert!(Cli::try_parse_from(["bgremove-mask"]).is_err());
        assert!(Cli::try_parse_from(["bgremove-mask", "--show-environment"]).is_ok());
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "bgremove-mask",
            "--model",
            "model.onnx",
            "--model-size",
            "320x320",
            "--interpretation",
            "class-index:0",
            "--backend",
            "tract:cpu",
            "--mode",
            "mask",
            "--output-dir",
            "out",
            "--shared-model",
            "-vv",
            "a.jpg",
            "b.png",
        ])
        .unwrap();

        assert_eq!(cli.input, vec!["a.jpg", "b.png"]);
        assert_eq!(cli.mode, Some(CliOutputMode::Mask));
        assert_eq!(cli.model_size.as_deref(), Some("320x320"));
        assert!(cli.shared_model);
        assert_eq!(cli.verbose, 2);
    }
}
