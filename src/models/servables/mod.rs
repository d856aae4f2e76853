//! Framework adapters for servable descriptions

pub mod keras;
pub mod python;
pub mod sklearn;

pub use keras::{KerasInspector, KerasModel};
pub use python::{PythonClassMethodModel, PythonStaticMethodModel};
pub use sklearn::{ScikitLearnModel, SklearnInspector};

use super::types::ArgumentBlock;
use crate::error::DlhubResult;
use std::path::Path;

/// Interface of a saved model, as far as it can be read from the artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactInterface {
    pub input: ArgumentBlock,
    pub output: ArgumentBlock,
    /// Class or architecture of the model, e.g. `SVC`
    pub model_type: Option<String>,
    /// Version of the framework that wrote the artifact
    pub framework_version: Option<String>,
    /// Human-readable description of the model structure
    pub summary: Option<String>,
}

/// Produces input/output descriptors from a saved artifact
pub trait ArtifactInspector: Send + Sync {
    fn inspect(&self, path: &Path) -> DlhubResult<ArtifactInterface>;
}
