//! Servable metadata module
//!
//! Provides functionality for:
//! - Describing servable inputs and outputs with typed argument blocks
//! - Recording publication metadata (DataCite) and visibility
//! - Resolving Python dependency versions
//! - Tracking and packaging the files a servable needs
//! - Building descriptions for Python, scikit-learn and Keras models

pub mod datacite;
pub mod files;
pub mod pickle;
pub mod requirements;
pub mod servable;
pub mod servables;
pub mod types;

pub use datacite::{Creator, Datacite, PLACEHOLDER_DOI};
pub use files::FileManifest;
pub use requirements::{PipVersionResolver, Requirement, StaticVersionResolver, VersionResolver};
pub use servable::{RUN_METHOD, ServableAdapter, ServableModel};
pub use servables::{
    ArtifactInspector, ArtifactInterface, KerasInspector, KerasModel, PythonClassMethodModel,
    PythonStaticMethodModel, ScikitLearnModel, SklearnInspector,
};
pub use types::{ArgumentBlock, ArgumentType};
