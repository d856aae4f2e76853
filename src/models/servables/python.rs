//! Servables backed by plain Python callables

use crate::error::DlhubResult;
use crate::models::pickle::inspect_pickle_file;
use crate::models::servable::{ServableAdapter, ServableModel};
use serde_json::{Map, Value, json};
use std::path::Path;

/// A module-level function, called as `module.method_name(inputs)`
#[derive(Debug, Clone, PartialEq)]
pub struct PythonStaticMethodModel {
    module: String,
    method_name: String,
    autobatch: bool,
}

impl PythonStaticMethodModel {
    /// Describe `module.method_name`
    ///
    /// With `autobatch`, the service calls the function once per entry of a
    /// list input and collects the results.
    pub fn create_model(module: &str, method_name: &str, autobatch: bool) -> ServableModel {
        ServableModel::new(Box::new(Self {
            module: module.to_string(),
            method_name: method_name.to_string(),
            autobatch,
        }))
    }
}

impl ServableAdapter for PythonStaticMethodModel {
    fn shim(&self) -> &str {
        "python.PythonStaticMethodServable"
    }

    fn servable_type(&self) -> &str {
        "Python static method"
    }

    fn method_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("module".to_string(), json!(self.module));
        details.insert("method_name".to_string(), json!(self.method_name));
        details.insert("autobatch".to_string(), json!(self.autobatch));
        details
    }
}

/// A method of a pickled Python object
#[derive(Debug, Clone, PartialEq)]
pub struct PythonClassMethodModel {
    class_name: String,
    method_name: String,
}

impl PythonClassMethodModel {
    /// Describe `method_name` on the object pickled at `path`
    ///
    /// The object's class is read from the pickle. `default_kwargs` become the
    /// method's default parameters.
    pub fn create_model(
        path: impl AsRef<Path>,
        method_name: &str,
        default_kwargs: Map<String, Value>,
    ) -> DlhubResult<ServableModel> {
        let path = path.as_ref();
        let summary = inspect_pickle_file(path)?;
        let class_name = summary.class_name.unwrap_or_else(|| "builtins.object".to_string());
        tracing::debug!(path = ?path, class = %class_name, "Inspected pickled object");

        let mut model = ServableModel::new(Box::new(Self {
            class_name,
            method_name: method_name.to_string(),
        }));
        model.add_file(path, Some("pickle"))?;
        model.set_parameters(default_kwargs);
        Ok(model)
    }
}

impl ServableAdapter for PythonClassMethodModel {
    fn shim(&self) -> &str {
        "python.PythonClassMethodServable"
    }

    fn servable_type(&self) -> &str {
        "Python class method"
    }

    fn method_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("class_name".to_string(), json!(self.class_name));
        details.insert("method_name".to_string(), json!(self.method_name));
        details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pickle::tests::estimator_pickle;
    use crate::models::types::{ArgumentBlock, ArgumentType};

    #[test]
    fn test_static_method_details() {
        let mut model = PythonStaticMethodModel::create_model("math", "sqrt", true);
        model
            .set_inputs(ArgumentBlock::list(
                "List of numbers",
                ArgumentBlock::of(ArgumentType::Float),
            ))
            .unwrap()
            .set_outputs(ArgumentBlock::scalar(ArgumentType::Float, "Square root of the number").unwrap())
            .unwrap();

        let doc = model.to_dict(false).unwrap();
        assert_eq!(
            doc["servable"]["methods"]["run"]["method_details"],
            json!({"module": "math", "method_name": "sqrt", "autobatch": true})
        );
        assert_eq!(model.shim(), "python.PythonStaticMethodServable");
    }

    #[test]
    fn test_class_method_reads_pickle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        std::fs::write(&path, estimator_pickle("sklearn.svm._classes", "SVC", "1.3.2")).unwrap();

        let mut kwargs = Map::new();
        kwargs.insert("fake".to_string(), json!("kwarg"));
        let mut model =
            PythonClassMethodModel::create_model(&path, "predict_proba", kwargs).unwrap();
        model
            .set_inputs(ArgumentBlock::ndarray("Features for each entry", vec![None, Some(4)]))
            .unwrap()
            .set_outputs(ArgumentBlock::ndarray(
                "Predicted probabilities of being each iris species",
                vec![None, Some(3)],
            ))
            .unwrap();

        let doc = model.to_dict(false).unwrap();
        let run = &doc["servable"]["methods"]["run"];
        assert_eq!(run["method_details"]["class_name"], "sklearn.svm._classes.SVC");
        assert_eq!(run["method_details"]["method_name"], "predict_proba");
        assert_eq!(run["parameters"], json!({"fake": "kwarg"}));
        assert_eq!(doc["dlhub"]["files"], json!({"pickle": path.to_string_lossy()}));
        assert_eq!(model.list_files(), vec![path]);
    }

    #[test]
    fn test_class_method_rejects_non_pickle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pkl");
        std::fs::write(&path, b"not a pickle").unwrap();

        assert!(PythonClassMethodModel::create_model(&path, "predict", Map::new()).is_err());
    }
}
