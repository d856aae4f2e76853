//! Document validation against the DLHub JSON schemas
//!
//! The schemas ship inside the crate and are compiled once per process. A
//! directory of replacement schema files can be loaded into a separate
//! [`SchemaRegistry`] to validate against newer or site-specific versions.

use crate::error::{DlhubError, DlhubResult, SchemaViolation};
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;

const SERVABLE_SCHEMA: &str = include_str!("../../schemas/servable.json");
const DATASET_SCHEMA: &str = include_str!("../../schemas/dataset.json");

/// Compiled embedded schemas, shared by every caller
static EMBEDDED: OnceLock<Result<SchemaRegistry, String>> = OnceLock::new();

/// Kind of document a schema describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaKind {
    Servable,
    Dataset,
}

impl SchemaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Servable => "servable",
            Self::Dataset => "dataset",
        }
    }

    fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }

    fn embedded_source(&self) -> &'static str {
        match self {
            Self::Servable => SERVABLE_SCHEMA,
            Self::Dataset => DATASET_SCHEMA,
        }
    }
}

impl std::fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SchemaKind {
    type Err = DlhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "servable" => Ok(Self::Servable),
            "dataset" => Ok(Self::Dataset),
            other => Err(DlhubError::InvalidArgument(format!(
                "Unknown schema kind: {}",
                other
            ))),
        }
    }
}

/// A compiled validator for each document kind
pub struct SchemaRegistry {
    servable: jsonschema::Validator,
    dataset: jsonschema::Validator,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry").finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    /// Compile the schemas bundled with the crate
    pub fn embedded() -> DlhubResult<Self> {
        Ok(Self {
            servable: compile(SchemaKind::Servable, SchemaKind::Servable.embedded_source())?,
            dataset: compile(SchemaKind::Dataset, SchemaKind::Dataset.embedded_source())?,
        })
    }

    /// Compile `servable.json` and `dataset.json` from `dir`
    ///
    /// A kind without a file in `dir` uses the bundled schema.
    pub fn from_dir(dir: &Path) -> DlhubResult<Self> {
        let load = |kind: SchemaKind| -> DlhubResult<jsonschema::Validator> {
            let path = dir.join(kind.file_name());
            if path.is_file() {
                tracing::debug!(schema = %kind, path = ?path, "Loading schema override");
                let source = std::fs::read_to_string(&path)?;
                compile(kind, &source)
            } else {
                compile(kind, kind.embedded_source())
            }
        };

        Ok(Self {
            servable: load(SchemaKind::Servable)?,
            dataset: load(SchemaKind::Dataset)?,
        })
    }

    /// Check `document` against the schema for `kind`, collecting every violation
    pub fn validate(&self, document: &Value, kind: SchemaKind) -> DlhubResult<()> {
        let validator = match kind {
            SchemaKind::Servable => &self.servable,
            SchemaKind::Dataset => &self.dataset,
        };

        let errors: Vec<SchemaViolation> = validator
            .iter_errors(document)
            .map(|error| SchemaViolation {
                instance_path: error.instance_path.to_string(),
                schema_path: error.schema_path.to_string(),
                message: error.to_string(),
            })
            .collect();

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(schema = %kind, violations = errors.len(), "Schema validation failed");
            Err(DlhubError::Validation {
                kind: kind.to_string(),
                errors,
            })
        }
    }
}

fn compile(kind: SchemaKind, source: &str) -> DlhubResult<jsonschema::Validator> {
    let schema: Value = serde_json::from_str(source)?;
    jsonschema::validator_for(&schema).map_err(|e| {
        DlhubError::InvalidArgument(format!("The {} schema does not compile: {}", kind, e))
    })
}

fn embedded() -> DlhubResult<&'static SchemaRegistry> {
    EMBEDDED
        .get_or_init(|| SchemaRegistry::embedded().map_err(|e| e.to_string()))
        .as_ref()
        .map_err(|reason| DlhubError::InvalidArgument(reason.clone()))
}

/// Validate `document` against the bundled schema for `kind`
pub fn validate_against_dlhub_schema(document: &Value, kind: SchemaKind) -> DlhubResult<()> {
    embedded()?.validate(document, kind)
}
