//! Execution provider parsing and listing

use crate::{
    config::{BackendType, ExecutionProvider},
    error::{BgRemovalError, Result},
};

/// Information about a backend/provider combination
#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub execution_provider: ExecutionProvider,
    pub available: bool,
    pub description: String,
}

/// Utility for parsing and listing execution providers
pub struct ExecutionProviderManager;

impl ExecutionProviderManager {
    /// Parse a provider string in `backend:provider` form
    ///
    /// Accepts `onnx:{auto,cpu,cuda,coreml}`, `tract:cpu`, `mock`, or a bare
    /// backend name which selects that backend's default provider.
    ///
    /// # Errors
    /// `InvalidConfig` for unknown backends or providers.
    ///
    /// # Examples
    /// ```rust
    /// use bgremove_mask::utils::ExecutionProviderManager;
    /// use bgremove_mask::{BackendType, ExecutionProvider};
    ///
    /// let (backend, provider) = ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
    /// assert_eq!(backend, BackendType::Tract);
    /// assert_eq!(provider, ExecutionProvider::Cpu);
    /// ```
    pub fn parse_provider_string(provider_str: &str) -> Result<(BackendType, ExecutionProvider)> {
        if let Some((backend, provider)) = provider_str.split_once(':') {
            match backend {
                "onnx" => {
                    let execution_provider = match provider {
                        "auto" => ExecutionProvider::Auto,
                        "cpu" => ExecutionProvider::Cpu,
                        "cuda" => ExecutionProvider::Cuda,
                        "coreml" => ExecutionProvider::CoreMl,
                        _ => {
                            return Err(BgRemovalError::invalid_config(format!(
                                "Unknown ONNX provider: {provider}. Supported: auto, cpu, cuda, coreml"
                            )));
                        },
                    };
                    Ok((BackendType::Onnx, execution_provider))
                },
                "tract" | "mock" => {
                    if provider != "cpu" {
                        return Err(BgRemovalError::invalid_config(format!(
                            "Unknown {backend} provider: {provider}. Only 'cpu' is supported"
                        )));
                    }
                    let backend_type = if backend == "tract" {
                        BackendType::Tract
                    } else {
                        BackendType::Mock
                    };
                    Ok((backend_type, ExecutionProvider::Cpu))
                },
                _ => Err(BgRemovalError::invalid_config(format!(
                    "Unknown backend: {backend}. Supported backends: onnx, tract, mock"
                ))),
            }
        } else {
            match provider_str {
                "onnx" => Ok((BackendType::Onnx, ExecutionProvider::Auto)),
                "tract" => Ok((BackendType::Tract, ExecutionProvider::Cpu)),
                "mock" => Ok((BackendType::Mock, ExecutionProvider::Cpu)),
                _ => Err(BgRemovalError::invalid_config(
                    "Invalid provider format. Use backend:provider (e.g., onnx:auto, tract:cpu) or mock",
                )),
            }
        }
    }

    /// Convert backend type and execution provider back to string
    #[must_use]
    pub fn provider_to_string(backend_type: BackendType, provider: ExecutionProvider) -> String {
        match backend_type {
            BackendType::Mock => "mock".to_string(),
            BackendType::Tract => "tract:cpu".to_string(),
            BackendType::Onnx => format!("onnx:{provider}"),
        }
    }

    /// Every backend/provider combination with its availability in this build
    #[must_use]
    pub fn list_all_providers() -> Vec<ProviderInfo> {
        let mut providers = Vec::new();

        #[cfg(feature = "onnx")]
        {
            let statuses = crate::backends::OnnxBackend::list_providers();
            let available = |name: &str| {
                statuses
                    .iter()
                    .any(|(n, ok, _)| *ok && n.eq_ignore_ascii_case(name))
            };
            let auto_available = statuses.iter().any(|(_, ok, _)| *ok);

            for (provider, is_available, description) in [
                (ExecutionProvider::Auto, auto_available, "ONNX Runtime with auto-selected provider"),
                (ExecutionProvider::Cpu, available("cpu"), "ONNX Runtime CPU execution"),
                (ExecutionProvider::Cuda, available("cuda"), "ONNX Runtime CUDA GPU acceleration"),
                (
                    ExecutionProvider::CoreMl,
                    available("coreml"),
                    "ONNX Runtime CoreML (Apple Silicon) acceleration",
                ),
            ] {
                providers.push(ProviderInfo {
                    name: Self::provider_to_string(BackendType::Onnx, provider),
                    backend_type: BackendType::Onnx,
                    execution_provider: provider,
                    available: is_available,
                    description: description.to_string(),
                });
            }
        }

        #[cfg(not(feature = "onnx"))]
        providers.push(ProviderInfo {
            name: "onnx:auto".to_string(),
            backend_type: BackendType::Onnx,
            execution_provider: ExecutionProvider::Auto,
            available: false,
            description: "ONNX Runtime (feature disabled)".to_string(),
        });

        providers.push(ProviderInfo {
            name: "tract:cpu".to_string(),
            backend_type: BackendType::Tract,
            execution_provider: ExecutionProvider::Cpu,
            available: cfg!(feature = "tract"),
            description: if cfg!(feature = "tract") {
                "Pure Rust CPU inference via Tract".to_string()
            } else {
                "Pure Rust CPU inference via Tract (feature disabled)".to_string()
            },
        });

        providers.push(ProviderInfo {
            name: "mock".to_string(),
            backend_type: BackendType::Mock,
            execution_provider: ExecutionProvider::Cpu,
            available: true,
            description: "Deterministic synthetic mask, no model inference".to_string(),
        });

        providers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_onnx_providers() {
        for (input, expected) in [
            ("onnx:auto", ExecutionProvider::Auto),
            ("onnx:cpu", ExecutionProvider::Cpu),
            ("onnx:cuda", ExecutionProvider::Cuda),
            ("onnx:coreml", ExecutionProvider::CoreMl),
            ("onnx", ExecutionProvider::Auto),
        ] {
            let (backend, provider) = ExecutionProviderManager::parse_provider_string(input).unwrap();
            assert_eq!(backend, BackendType::Onnx);
            assert_eq!(provider, expected);
        }
    }

    #[test]
    fn test_parse_tract_and_mock() {
        let (backend, provider) = ExecutionProviderManager::parse_provider_string("tract:cpu").unwrap();
        assert_eq!(backend, BackendType::Tract);
        assert_eq!(provider, ExecutionProvider::Cpu);

        let (backend, _) = ExecutionProviderManager::parse_provider_string("mock").unwrap();
        assert_eq!(backend, BackendType::Mock);

        assert!(ExecutionProviderManager::parse_provider_string("tract:cuda").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("mock:auto").is_err());
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ExecutionProviderManager::parse_provider_string("invalid").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("onnx:invalid").is_err());
        assert!(ExecutionProviderManager::parse_provider_string("invalid:auto").is_err());
    }

    #[test]
    fn test_provider_to_string() {
        assert_eq!(
            ExecutionProviderManager::provider_to_string(BackendType::Onnx, ExecutionProvider::CoreMl),
            "onnx:coreml"
        );
        assert_eq!(
            ExecutionProviderManager::provider_to_string(BackendType::Tract, ExecutionProvider::Cpu),
            "tract:cpu"
        );
    }

    #[test]
    fn test_list_all_providers() {
        let providers = ExecutionProviderManager::list_all_providers();
        let names: Vec<&str> = providers.iter().map(|p| p.name.as_str()).collect();
        assert!(names.contains(&"onnx:auto"));
        assert!(names.contains(&"tract:cpu"));
        assert!(providers.iter().any(|p| p.name == "mock" && p.available));
    }
}
