//! Execution environment capability probing
//!
//! A remover refuses to run at all when the environment cannot execute the
//! model. The probe runs once at construction; every call then checks the
//! stored verdict before touching the model or any pixel data.

use crate::config::{BackendType, ExecutionProvider, RemovalConfig};
use crate::error::{BgRemovalError, Result};
use serde::Serialize;

/// Setting this variable to anything but `0`/`false` marks the host as unable
/// to run the model, the way an emulator without a neural engine would be.
pub const UNSUPPORTED_ENV_VAR: &str = "BGREMOVE_UNSUPPORTED_ENVIRONMENT";

/// Availability of one execution provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub name: String,
    pub available: bool,
    pub description: String,
}

/// Outcome of probing the execution environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionEnvironment {
    pub backend: BackendType,
    pub execution_provider: ExecutionProvider,
    pub compiled_backends: Vec<BackendType>,
    pub providers: Vec<ProviderStatus>,
    pub unsupported_reason: Option<String>,
}

impl ExecutionEnvironment {
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.unsupported_reason.is_none()
    }

    /// # Errors
    /// `UnsupportedEnvironment` with the recorded reason.
    pub fn ensure_supported(&self) -> Result<()> {
        match self.unsupported_reason {
            Some(ref reason) => Err(BgRemovalError::unsupported_environment(reason.clone())),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn has_accelerator(&self) -> bool {
        self.providers
            .iter()
            .any(|p| p.available && p.name != "CPU")
    }
}

/// Decides whether the current environment can run the configured model
pub trait EnvironmentProbe: Send + Sync {
    fn probe(&self, config: &RemovalConfig) -> ExecutionEnvironment;
}

/// Probe backed by compile-time features and runtime provider detection
#[derive(Debug, Default, Clone, Copy)]
pub struct RuntimeProbe;

impl EnvironmentProbe for RuntimeProbe {
    fn probe(&self, config: &RemovalConfig) -> ExecutionEnvironment {
        let flag = std::env::var(UNSUPPORTED_ENV_VAR).ok();
        let providers = provider_statuses(config.backend);
        evaluate(config, flag.as_deref(), providers)
    }
}

/// Fixed verdict, for tests and embedders that gate environments themselves
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    reason: Option<String>,
}

impl StaticProbe {
    #[must_use]
    pub fn supported() -> Self {
        Self { reason: None }
    }

    pub fn unsupported<S: Into<String>>(reason: S) -> Self {
        Self {
            reason: Some(reason.into()),
        }
    }
}

impl EnvironmentProbe for StaticProbe {
    fn probe(&self, config: &RemovalConfig) -> ExecutionEnvironment {
        ExecutionEnvironment {
            backend: config.backend,
            execution_provider: config.execution_provider,
            compiled_backends: compiled_backends(),
            providers: vec![cpu_status()],
            unsupported_reason: self.reason.clone(),
        }
    }
}

/// Backends built into this binary
#[must_use]
pub fn compiled_backends() -> Vec<BackendType> {
    let mut backends = Vec::new();
    #[cfg(feature = "onnx")]
    backends.push(BackendType::Onnx);
    #[cfg(feature = "tract")]
    backends.push(BackendType::Tract);
    backends.push(BackendType::Mock);
    backends
}

fn cpu_status() -> ProviderStatus {
    ProviderStatus {
        name: "CPU".to_string(),
        available: true,
        description: "Always available, uses CPU for inference".to_string(),
    }
}

fn provider_statuses(backend: BackendType) -> Vec<ProviderStatus> {
    match backend {
        #[cfg(feature = "onnx")]
        BackendType::Onnx => crate::backends::OnnxBackend::list_providers()
            .into_iter()
            .map(|(name, available, description)| ProviderStatus {
                name,
                available,
                description,
            })
            .collect(),
        #[cfg(feature = "tract")]
        BackendType::Tract => crate::backends::TractBackend::list_providers()
            .into_iter()
            .map(|(name, available, description)| ProviderStatus {
                name,
                available,
                description,
            })
            .collect(),
        _ => vec![cpu_status()],
    }
}

fn flag_is_set(value: Option<&str>) -> bool {
    value.is_some_and(|v| {
        let v = v.trim();
        !v.is_empty() && v != "0" && !v.eq_ignore_ascii_case("false")
    })
}

fn evaluate(
    config: &RemovalConfig,
    unsupported_flag: Option<&str>,
    providers: Vec<ProviderStatus>,
) -> ExecutionEnvironment {
    let compiled = compiled_backends();

    let unsupported_reason = if flag_is_set(unsupported_flag) {
        Some(format!(
            "execution environment cannot run the segmentation model ({UNSUPPORTED_ENV_VAR} is set)"
        ))
    } else if !compiled.contains(&config.backend) {
        Some(format!(
            "backend '{}' is not compiled into this build",
            config.backend
        ))
    } else if config.require_acceleration {
        missing_acceleration(config, &providers)
    } else {
        None
    };

    ExecutionEnvironment {
        backend: config.backend,
        execution_provider: config.execution_provider,
        compiled_backends: compiled,
        providers,
        unsupported_reason,
    }
}

fn missing_acceleration(config: &RemovalConfig, providers: &[ProviderStatus]) -> Option<String> {
    let available = |name: &str| {
        providers
            .iter()
            .any(|p| p.available && p.name.eq_ignore_ascii_case(name))
    };

    match config.execution_provider {
        ExecutionProvider::Cpu => None,
        ExecutionProvider::Cuda if available("CUDA") => None,
        ExecutionProvider::CoreMl if available("CoreML") => None,
        ExecutionProvider::Auto if available("CUDA") || available("CoreML") => None,
        provider => Some(format!(
            "hardware acceleration required but provider '{provider}' is not available for backend '{}'",
            config.backend
        )),
    }
}
