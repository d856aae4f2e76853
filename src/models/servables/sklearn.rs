//! scikit-learn estimators saved with pickle

use super::{ArtifactInspector, ArtifactInterface};
use crate::error::DlhubResult;
use crate::models::pickle::inspect_pickle_file;
use crate::models::servable::{ServableAdapter, ServableModel};
use crate::models::types::ArgumentBlock;
use serde_json::{Map, Value, json};
use std::path::Path;

/// Reads estimator class and library version from a pickled estimator
///
/// Input width and class labels cannot be read without unpickling, so they
/// are supplied by the caller.
#[derive(Debug, Clone)]
pub struct SklearnInspector {
    pub n_input_columns: u64,
    pub classes: Option<Vec<Value>>,
}

impl ArtifactInspector for SklearnInspector {
    fn inspect(&self, path: &Path) -> DlhubResult<ArtifactInterface> {
        let summary = inspect_pickle_file(path)?;

        let input = ArgumentBlock::ndarray(
            "List of records to evaluate with model. Each record is a list of variables.",
            vec![None, Some(self.n_input_columns)],
        );
        let output = match &self.classes {
            Some(classes) => ArgumentBlock::ndarray(
                "Probabilities for membership in each of the classes",
                vec![None, Some(classes.len() as u64)],
            ),
            None => ArgumentBlock::ndarray("Response for each of the records", vec![None]),
        };

        Ok(ArtifactInterface {
            input,
            output,
            model_type: summary.short_class_name().map(str::to_string),
            framework_version: summary.sklearn_version,
            summary: summary.class_name,
        })
    }
}

/// Servable that runs a pickled scikit-learn estimator
#[derive(Debug, Clone, PartialEq)]
pub struct ScikitLearnModel {
    model_type: String,
    version: Option<String>,
    classes: Option<Vec<Value>>,
}

impl ScikitLearnModel {
    /// Describe the estimator pickled at `path`
    ///
    /// With `classes`, the servable calls `predict_proba` and returns one
    /// probability per class. Without, it calls `predict`.
    pub fn create_model(
        path: impl AsRef<Path>,
        n_input_columns: u64,
        classes: Option<Vec<Value>>,
    ) -> DlhubResult<ServableModel> {
        let inspector = SklearnInspector {
            n_input_columns,
            classes: classes.clone(),
        };
        Self::create_model_with(path, classes, &inspector)
    }

    /// Same as [`ScikitLearnModel::create_model`] with a caller-supplied inspector
    pub fn create_model_with(
        path: impl AsRef<Path>,
        classes: Option<Vec<Value>>,
        inspector: &dyn ArtifactInspector,
    ) -> DlhubResult<ServableModel> {
        let path = path.as_ref();
        let interface = inspector.inspect(path)?;
        tracing::debug!(
            path = ?path,
            model_type = ?interface.model_type,
            version = ?interface.framework_version,
            "Inspected scikit-learn estimator"
        );

        let adapter = Self {
            model_type: interface
                .model_type
                .unwrap_or_else(|| "estimator".to_string()),
            version: interface.framework_version.clone(),
            classes,
        };

        let mut model = ServableModel::new(Box::new(adapter));
        model
            .set_inputs(interface.input)?
            .set_outputs(interface.output)?
            .add_file(path, Some("model"))?
            .add_requirement(
                "scikit-learn",
                interface.framework_version.as_deref().unwrap_or("detect"),
            );
        Ok(model)
    }

    fn method_name(&self) -> &str {
        if self.classes.is_some() {
            "predict_proba"
        } else {
            "predict"
        }
    }
}

impl ServableAdapter for ScikitLearnModel {
    fn shim(&self) -> &str {
        "sklearn.ScikitLearnServable"
    }

    fn servable_type(&self) -> &str {
        "scikit-learn"
    }

    fn method_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("method_name".to_string(), json!(self.method_name()));
        if let Some(classes) = &self.classes {
            details.insert("classes".to_string(), json!(classes));
        }
        details
    }

    fn servable_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("model_type".to_string(), json!(self.model_type));
        if let Some(version) = &self.version {
            fields.insert("version".to_string(), json!(version));
        }
        fields.insert(
            "options".to_string(),
            json!({"serialization_method": "pickle"}),
        );
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pickle::tests::estimator_pickle;

    fn write_svc(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("model.pkl");
        std::fs::write(&path, estimator_pickle("sklearn.svm.classes", "SVC", "0.19.1")).unwrap();
        path
    }

    #[test]
    fn test_classifier_description() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_svc(dir.path());

        let classes = vec![json!("setosa"), json!("versicolor"), json!("virginica")];
        let mut model = ScikitLearnModel::create_model(&path, 4, Some(classes)).unwrap();
        model.set_name("iris_svm").set_title("Iris SVM");

        let doc = model.to_dict(true).unwrap();
        let servable = &doc["servable"];
        assert_eq!(servable["type"], "scikit-learn");
        assert_eq!(servable["shim"], "sklearn.ScikitLearnServable");
        assert_eq!(servable["model_type"], "SVC");
        assert_eq!(servable["version"], "0.19.1");
        assert_eq!(servable["options"]["serialization_method"], "pickle");

        let run = &servable["methods"]["run"];
        assert_eq!(run["input"]["shape"], json!([null, 4]));
        assert_eq!(run["output"]["shape"], json!([null, 3]));
        assert_eq!(run["method_details"]["method_name"], "predict_proba");
        assert_eq!(run["method_details"]["classes"][1], "versicolor");

        assert_eq!(doc["dlhub"]["files"], json!({"model": "model.pkl"}));
        assert_eq!(
            doc["dlhub"]["dependencies"]["python"],
            json!({"scikit-learn": "0.19.1"})
        );
    }

    #[test]
    fn test_regressor_uses_predict() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_svc(dir.path());

        let model = ScikitLearnModel::create_model(&path, 2, None).unwrap();
        let doc = model.to_dict(false).unwrap();
        let run = &doc["servable"]["methods"]["run"];
        assert_eq!(run["method_details"], json!({"method_name": "predict"}));
        assert_eq!(run["output"]["shape"], json!([null]));
    }

    #[test]
    fn test_missing_file() {
        let result = ScikitLearnModel::create_model("/nonexistent/dlhub/model.pkl", 4, None);
        assert!(result.is_err());
    }
}
