//! Model artifact resolution.
//!
//! Artifacts are safetensors files whose `__metadata__` names the artifact kind
//! and, for whole modules, the fully-qualified architecture class they were
//! saved from. Deserializing a module resolves that class against an
//! [`ArchitectureRegistry`]. Artifacts exported from a training script record
//! the class under `__main__`, which the registry does not know about; an
//! [`ArtifactAdapter`] may repair the registry once and the load is retried.

use crate::model::{SentiNN, SentimentNetwork};
use crate::tokenizer::Vocabulary;
use crate::{InferenceError, LoadError};
use candle_core::{Device, Tensor};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

pub const METADATA_KIND: &str = "artifact_kind";
pub const METADATA_ARCHITECTURE: &str = "architecture";
const DEFAULT_NAMESPACE: &str = "__main__";

pub type ArchitectureFactory =
    fn(HashMap<String, Tensor>, &Device) -> candle_core::Result<Box<dyn SentimentNetwork>>;

fn build_sentinn(
    parameters: HashMap<String, Tensor>,
    device: &Device,
) -> candle_core::Result<Box<dyn SentimentNetwork>> {
    Ok(Box::new(SentiNN::from_parameters(parameters, device)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Module,
    StateDict,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Module => "module",
            ArtifactKind::StateDict => "state_dict",
        }
    }
}

/// Qualified class name -> constructor.
#[derive(Clone, Default)]
pub struct ArchitectureRegistry {
    factories: HashMap<String, ArchitectureFactory>,
}

impl ArchitectureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the architectures this crate ships, under their home modules.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(SentiNN::HOME_NAMESPACE, SentiNN::CLASS_NAME, build_sentinn);
        registry
    }

    pub fn register(&mut self, namespace: &str, class: &str, factory: ArchitectureFactory) {
        self.factories.insert(format!("{namespace}.{class}"), factory);
    }

    pub fn contains(&self, qualified: &str) -> bool {
        self.factories.contains_key(qualified)
    }

    pub fn resolve(&self, qualified: &str) -> Result<ArchitectureFactory, LoadError> {
        if let Some(factory) = self.factories.get(qualified) {
            return Ok(*factory);
        }
        let (namespace, class) = qualified
            .rsplit_once('.')
            .unwrap_or((DEFAULT_NAMESPACE, qualified));
        Err(LoadError::ArchitectureNotFound {
            namespace: namespace.to_string(),
            class: class.to_string(),
        })
    }
}

impl fmt::Debug for ArchitectureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("ArchitectureRegistry")
            .field("architectures", &names)
            .finish()
    }
}

/// A deserialized artifact: either a ready network or a bare parameter dictionary.
pub enum Artifact {
    Module(Box<dyn SentimentNetwork>),
    StateDict(HashMap<String, Tensor>),
}

impl Artifact {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Artifact::Module(_) => ArtifactKind::Module,
            Artifact::StateDict(_) => ArtifactKind::StateDict,
        }
    }

    pub fn as_network(&self) -> Option<&dyn SentimentNetwork> {
        match self {
            Artifact::Module(network) => Some(network.as_ref()),
            Artifact::StateDict(_) => None,
        }
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Artifact::Module(network) => f
                .debug_tuple("Module")
                .field(&network.architecture())
                .finish(),
            Artifact::StateDict(parameters) => f
                .debug_tuple("StateDict")
                .field(&parameters.len())
                .finish(),
        }
    }
}

/// Strategy for repairing a known deserialization incompatibility.
pub trait ArtifactAdapter: Send + Sync {
    fn name(&self) -> &str;

    /// Returns `true` when `registry` was repaired and a retry may succeed.
    fn recover(&self, error: &LoadError, registry: &mut ArchitectureRegistry) -> bool;
}

/// Registers a real architecture under whatever namespace the artifact expects.
pub struct MissingArchitectureAdapter {
    class: &'static str,
    factory: ArchitectureFactory,
}

impl MissingArchitectureAdapter {
    pub fn new(class: &'static str, factory: ArchitectureFactory) -> Self {
        Self { class, factory }
    }

    pub fn sentinn() -> Self {
        Self::new(SentiNN::CLASS_NAME, build_sentinn)
    }
}

impl ArtifactAdapter for MissingArchitectureAdapter {
    fn name(&self) -> &str {
        "missing-architecture"
    }

    fn recover(&self, error: &LoadError, registry: &mut ArchitectureRegistry) -> bool {
        let LoadError::ArchitectureNotFound { namespace, class } = error else {
            return false;
        };
        let message = error.to_string();
        if !message.contains(&format!("'{}'", self.class)) || class != self.class {
            return false;
        }
        registry.register(namespace, self.class, self.factory);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceRequest {
    /// CUDA when available, CPU otherwise.
    #[default]
    Auto,
    Cpu,
    Cuda(usize),
}

impl DeviceRequest {
    pub fn resolve(&self) -> Result<Device, LoadError> {
        let unavailable = |e: candle_core::Error| LoadError::DeviceUnavailable {
            requested: self.to_string(),
            message: e.to_string(),
        };
        match self {
            DeviceRequest::Auto => Device::cuda_if_available(0).map_err(unavailable),
            DeviceRequest::Cpu => Ok(Device::Cpu),
            DeviceRequest::Cuda(ordinal) => Device::new_cuda(*ordinal).map_err(unavailable),
        }
    }
}

impl fmt::Display for DeviceRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceRequest::Auto => write!(f, "auto"),
            DeviceRequest::Cpu => write!(f, "cpu"),
            DeviceRequest::Cuda(ordinal) => write!(f, "cuda:{ordinal}"),
        }
    }
}

impl FromStr for DeviceRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(DeviceRequest::Auto),
            "cpu" => Ok(DeviceRequest::Cpu),
            "cuda" | "gpu" => Ok(DeviceRequest::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|n| n.parse().ok())
                .map(DeviceRequest::Cuda)
                .ok_or_else(|| format!("unknown device '{s}' (expected auto, cpu, cuda or cuda:N)")),
        }
    }
}

#[derive(Deserialize)]
struct SafetensorsHeader {
    #[serde(rename = "__metadata__", default)]
    metadata: HashMap<String, String>,
}

fn read_header_metadata(bytes: &[u8]) -> Result<HashMap<String, String>, String> {
    let len_bytes: [u8; 8] = bytes
        .get(..8)
        .and_then(|b| b.try_into().ok())
        .ok_or("file is shorter than the safetensors header")?;
    let header_len = usize::try_from(u64::from_le_bytes(len_bytes))
        .map_err(|_| "header length overflows usize".to_string())?;
    let header = header_len
        .checked_add(8)
        .and_then(|end| bytes.get(8..end))
        .ok_or("truncated safetensors header")?;
    let header: SafetensorsHeader =
        serde_json::from_slice(header).map_err(|e| format!("invalid header: {e}"))?;
    Ok(header.metadata)
}

/// Deserializes an artifact onto the CPU, resolving module classes through `registry`.
pub fn read_artifact(path: &Path, registry: &ArchitectureRegistry) -> Result<Artifact, LoadError> {
    let display = path.display().to_string();
    if !path.exists() {
        return Err(LoadError::ArtifactNotFound { path: display });
    }

    let bytes = std::fs::read(path).map_err(|e| LoadError::artifact_format(&display, e))?;
    let metadata =
        read_header_metadata(&bytes).map_err(|e| LoadError::artifact_format(&display, e))?;
    let parameters = candle_core::safetensors::load_buffer(&bytes, &Device::Cpu)
        .map_err(|e| LoadError::artifact_format(&display, e))?;

    match metadata.get(METADATA_KIND).map(String::as_str) {
        Some("module") => {
            let architecture = metadata.get(METADATA_ARCHITECTURE).ok_or_else(|| {
                LoadError::artifact_format(&display, "module artifact without an architecture")
            })?;
            let factory = registry.resolve(architecture)?;
            let network = factory(parameters, &Device::Cpu)
                .map_err(|e| LoadError::artifact_format(&display, e))?;
            Ok(Artifact::Module(network))
        }
        Some("state_dict") => Ok(Artifact::StateDict(parameters)),
        Some(other) => Err(LoadError::artifact_format(
            &display,
            format!("unknown artifact kind '{other}'"),
        )),
        None => Err(LoadError::artifact_format(
            &display,
            format!("missing '{METADATA_KIND}' metadata"),
        )),
    }
}

/// Writes `parameters` as an artifact readable by [`read_artifact`].
pub fn save_artifact(
    path: &Path,
    kind: ArtifactKind,
    architecture: Option<&str>,
    parameters: &HashMap<String, Tensor>,
) -> crate::Result<()> {
    let mut metadata = HashMap::new();
    metadata.insert(METADATA_KIND.to_string(), kind.as_str().to_string());
    match (kind, architecture) {
        (ArtifactKind::Module, Some(architecture)) => {
            metadata.insert(METADATA_ARCHITECTURE.to_string(), architecture.to_string());
        }
        (ArtifactKind::Module, None) => {
            return Err(InferenceError::Artifact(
                "module artifacts must name their architecture".to_string(),
            ))
        }
        (ArtifactKind::StateDict, _) => {}
    }

    safetensors::tensor::serialize_to_file(
        parameters.iter().map(|(name, tensor)| (name.as_str(), tensor)),
        &Some(metadata),
        path,
    )
    .map_err(|e| InferenceError::Artifact(e.to_string()))
}

/// Model and vocabulary ready for inference.
#[derive(Debug)]
pub struct LoadedModel {
    pub artifact: Artifact,
    pub vocabulary: Vocabulary,
    pub device: Device,
    /// Deserialization attempts made (1, or 2 when an adapter fired).
    pub attempts: u32,
    pub recovered_by: Option<String>,
}

pub struct ModelLoader {
    registry: ArchitectureRegistry,
    adapters: Vec<Box<dyn ArtifactAdapter>>,
    device: DeviceRequest,
}

impl Default for ModelLoader {
    fn default() -> Self {
        Self::new(DeviceRequest::default())
    }
}

impl ModelLoader {
    pub fn new(device: DeviceRequest) -> Self {
        Self {
            registry: ArchitectureRegistry::with_builtin(),
            adapters: vec![Box::new(MissingArchitectureAdapter::sentinn())],
            device,
        }
    }

    pub fn with_registry(mut self, registry: ArchitectureRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_adapter(mut self, adapter: Box<dyn ArtifactAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn without_adapters(mut self) -> Self {
        self.adapters.clear();
        self
    }

    pub fn load(&self, model_path: &Path, vocab_path: &Path) -> Result<LoadedModel, LoadError> {
        let device = self.device.resolve()?;
        info!("Loading model from: {:?} (device: {:?})", model_path, device);

        let (artifact, attempts, recovered_by) = self.read_with_recovery(model_path)?;
        let artifact = place(artifact, &device, self.device)?;
        let vocabulary = Vocabulary::from_file(vocab_path)?;

        info!(
            "Model ready: {:?}, vocabulary of {} tokens, {} attempt(s)",
            artifact,
            vocabulary.len(),
            attempts
        );
        Ok(LoadedModel {
            artifact,
            vocabulary,
            device,
            attempts,
            recovered_by,
        })
    }

    /// Reads once; on failure lets the first adapter that recognises the error
    /// repair a private copy of the registry, then reads exactly once more.
    pub fn read_with_recovery(
        &self,
        path: &Path,
    ) -> Result<(Artifact, u32, Option<String>), LoadError> {
        let mut registry = self.registry.clone();
        let err = match read_artifact(path, &registry) {
            Ok(artifact) => return Ok((artifact, 1, None)),
            Err(err) => err,
        };

        let Some(adapter) = self
            .adapters
            .iter()
            .find(|adapter| adapter.recover(&err, &mut registry))
        else {
            return Err(err);
        };

        warn!("{}; retrying with adapter '{}'", err, adapter.name());
        let artifact = read_artifact(path, &registry)?;
        Ok((artifact, 2, Some(adapter.name().to_string())))
    }
}

/// Moves a module onto `device` in inference mode. Parameter dictionaries are left as-is.
fn place(artifact: Artifact, device: &Device, request: DeviceRequest) -> Result<Artifact, LoadError> {
    match artifact {
        Artifact::Module(mut network) => {
            network
                .to_device(device)
                .map_err(|e| LoadError::DeviceUnavailable {
                    requested: request.to_string(),
                    message: e.to_string(),
                })?;
            network.eval();
            Ok(Artifact::Module(network))
        }
        Artifact::StateDict(parameters) => {
            warn!(
                "Artifact is a parameter dictionary ({} tensors), not a model; skipping device placement",
                parameters.len()
            );
            Ok(Artifact::StateDict(parameters))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_resolves_builtin() {
        let registry = ArchitectureRegistry::with_builtin();
        assert!(registry.resolve(&SentiNN::qualified_name()).is_ok());
    }

    #[test]
    fn test_registry_miss_names_namespace_and_class() {
        let registry = ArchitectureRegistry::with_builtin();
        let err = registry.resolve("__main__.SentiNN").err().unwrap();
        assert_eq!(
            err.to_string(),
            "Can't get attribute 'SentiNN' on <module '__main__'>"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_adapter_registers_under_expected_namespace() {
        let mut registry = ArchitectureRegistry::with_builtin();
        let err = registry.resolve("__main__.SentiNN").err().unwrap();
        assert!(MissingArchitectureAdapter::sentinn().recover(&err, &mut registry));
        assert!(registry.contains("__main__.SentiNN"));
    }

    #[test]
    fn test_adapter_ignores_other_classes_and_errors() {
        let adapter = MissingArchitectureAdapter::sentinn();
        let mut registry = ArchitectureRegistry::new();

        let other = registry.resolve("__main__.OtherNet").err().unwrap();
        assert!(!adapter.recover(&other, &mut registry));

        let not_found = LoadError::ArtifactNotFound {
            path: "SentiNN.safetensors".to_string(),
        };
        assert!(!adapter.recover(&not_found, &mut registry));
        assert!(!registry.contains("__main__.SentiNN"));
    }

    #[test]
    fn test_device_request_parsing() {
        assert_eq!("auto".parse::<DeviceRequest>().unwrap(), DeviceRequest::Auto);
        assert_eq!("CPU".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cpu);
        assert_eq!("cuda".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cuda(0));
        assert_eq!("cuda:3".parse::<DeviceRequest>().unwrap(), DeviceRequest::Cuda(3));
        assert!("tpu".parse::<DeviceRequest>().is_err());
        assert_eq!(DeviceRequest::Cuda(2).to_string(), "cuda:2");
    }

    #[test]
    fn test_header_metadata_rejects_truncated_files() {
        assert!(read_header_metadata(b"abc").is_err());
        let mut bytes = 100u64.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        assert!(read_header_metadata(&bytes).is_err());
    }
}
