//! Keras models, described from their saved architecture
//!
//! Accepts either the JSON written by `model.to_json()` or an HDF5 file saved
//! with `model.save()`, whose `model_config` attribute holds the same JSON.

use super::{ArtifactInspector, ArtifactInterface};
use crate::error::{DlhubError, DlhubResult};
use crate::models::servable::{ServableAdapter, ServableModel};
use crate::models::types::ArgumentBlock;
use serde_json::{Map, Value, json};
use std::path::Path;

const HDF5_SIGNATURE: &[u8] = b"\x89HDF\r\n\x1a\n";

/// Layers whose output has the same shape as their input
const SHAPE_PRESERVING: &[&str] = &[
    "Activation",
    "ActivityRegularization",
    "AlphaDropout",
    "BatchNormalization",
    "Dropout",
    "ELU",
    "GaussianDropout",
    "GaussianNoise",
    "LayerNormalization",
    "LeakyReLU",
    "Masking",
    "PReLU",
    "ReLU",
    "Softmax",
    "SpatialDropout1D",
    "SpatialDropout2D",
    "SpatialDropout3D",
    "ThresholdedReLU",
];

/// Reads tensor shapes and a layer summary from a saved Keras architecture
#[derive(Debug, Clone, Copy, Default)]
pub struct KerasInspector;

impl ArtifactInspector for KerasInspector {
    fn inspect(&self, path: &Path) -> DlhubResult<ArtifactInterface> {
        let bytes = std::fs::read(path)?;
        let fail = |reason: String| DlhubError::Introspection {
            path: path.to_string_lossy().to_string(),
            reason,
        };

        let architecture = read_architecture(&bytes).map_err(fail)?;
        let layers = layer_list(&architecture);
        if layers.is_empty() {
            return Err(fail("architecture has no layers".to_string()));
        }

        let inputs = input_shapes(&architecture, &layers).map_err(fail)?;
        let outputs = output_shapes(&architecture, &layers).map_err(fail)?;

        Ok(ArtifactInterface {
            input: tensor_block(inputs),
            output: tensor_block(outputs),
            model_type: architecture["class_name"].as_str().map(str::to_string),
            framework_version: architecture["keras_version"].as_str().map(str::to_string),
            summary: Some(summarize(&architecture, &layers)),
        })
    }
}

/// Servable that runs `predict` on a Keras model
#[derive(Debug, Clone, PartialEq)]
pub struct KerasModel {
    output_names: Vec<Value>,
    summary: String,
}

impl KerasModel {
    /// Describe the model saved at `path`
    ///
    /// `output_names` label the entries of the output layer.
    pub fn create_model(path: impl AsRef<Path>, output_names: Vec<Value>) -> DlhubResult<ServableModel> {
        Self::create_model_with(path, output_names, &KerasInspector)
    }

    /// Same as [`KerasModel::create_model`] with a caller-supplied inspector
    pub fn create_model_with(
        path: impl AsRef<Path>,
        output_names: Vec<Value>,
        inspector: &dyn ArtifactInspector,
    ) -> DlhubResult<ServableModel> {
        let path = path.as_ref();
        let interface = inspector.inspect(path)?;
        tracing::debug!(
            path = ?path,
            architecture = ?interface.model_type,
            keras_version = ?interface.framework_version,
            "Inspected Keras model"
        );

        let adapter = Self {
            output_names,
            summary: interface.summary.unwrap_or_default(),
        };

        let mut model = ServableModel::new(Box::new(adapter));
        model
            .set_inputs(interface.input)?
            .set_outputs(interface.output)?
            .add_file(path, Some("model"))?
            .add_requirement(
                "keras",
                interface.framework_version.as_deref().unwrap_or("detect"),
            )
            .add_requirement("h5py", "detect");
        Ok(model)
    }
}

impl ServableAdapter for KerasModel {
    fn shim(&self) -> &str {
        "keras.KerasServable"
    }

    fn servable_type(&self) -> &str {
        "Keras Model"
    }

    fn method_details(&self) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("method_name".to_string(), json!("predict"));
        details.insert("classes".to_string(), json!(self.output_names));
        details
    }

    fn servable_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("model_type".to_string(), json!("Deep NN"));
        fields.insert("model_summary".to_string(), json!(self.summary));
        fields
    }
}

fn read_architecture(bytes: &[u8]) -> Result<Value, String> {
    if bytes.starts_with(HDF5_SIGNATURE) {
        return embedded_architecture(bytes)
            .ok_or_else(|| "no model_config found in HDF5 file".to_string());
    }
    serde_json::from_slice(bytes).map_err(|e| format!("invalid architecture JSON: {}", e))
}

/// First JSON object in the file that parses as a model configuration
fn embedded_architecture(bytes: &[u8]) -> Option<Value> {
    bytes
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'{')
        .find_map(|(start, _)| {
            let mut stream =
                serde_json::Deserializer::from_slice(&bytes[start..]).into_iter::<Value>();
            match stream.next() {
                Some(Ok(value))
                    if value.get("class_name").is_some_and(Value::is_string)
                        && !layer_list(&value).is_empty() =>
                {
                    Some(value)
                }
                _ => None,
            }
        })
}

/// Layers in definition order; old Sequential configs are a bare list
fn layer_list(architecture: &Value) -> Vec<&Value> {
    let config = &architecture["config"];
    match config {
        Value::Array(layers) => layers.iter().collect(),
        Value::Object(_) => config["layers"]
            .as_array()
            .map(|layers| layers.iter().collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn layer_name(layer: &Value) -> Option<&str> {
    layer["config"]["name"]
        .as_str()
        .or_else(|| layer["name"].as_str())
}

/// Names listed under `input_layers`/`output_layers` of a functional model
fn endpoint_names<'a>(architecture: &'a Value, key: &str) -> Vec<&'a str> {
    architecture["config"][key]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry {
                    Value::Array(parts) => parts.first().and_then(Value::as_str),
                    Value::String(name) => Some(name.as_str()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

fn declared_shape(layer: &Value) -> Option<Vec<Option<u64>>> {
    let config = &layer["config"];
    let shape = config
        .get("batch_input_shape")
        .or_else(|| config.get("batch_shape"))?
        .as_array()?;
    Some(shape.iter().map(Value::as_u64).collect())
}

fn input_shapes(architecture: &Value, layers: &[&Value]) -> Result<Vec<Vec<Option<u64>>>, String> {
    let names = endpoint_names(architecture, "input_layers");
    if names.is_empty() {
        return layers
            .iter()
            .find_map(|layer| declared_shape(layer))
            .map(|shape| vec![shape])
            .ok_or_else(|| "no layer declares an input shape".to_string());
    }

    names
        .iter()
        .map(|name| {
            layers
                .iter()
                .find(|layer| layer_name(layer) == Some(*name))
                .and_then(|layer| declared_shape(layer))
                .ok_or_else(|| format!("input layer '{}' has no declared shape", name))
        })
        .collect()
}

fn output_shapes(architecture: &Value, layers: &[&Value]) -> Result<Vec<Vec<Option<u64>>>, String> {
    let names = endpoint_names(architecture, "output_layers");
    if names.is_empty() {
        return output_shape_before(layers, layers.len() - 1).map(|shape| vec![shape]);
    }

    names
        .iter()
        .map(|name| {
            let index = layers
                .iter()
                .position(|layer| layer_name(layer) == Some(*name))
                .ok_or_else(|| format!("output layer '{}' not found", name))?;
            output_shape_before(layers, index)
        })
        .collect()
}

/// Output shape of the layer at `index`
///
/// Shape-preserving layers defer to the layer before them; any layer whose
/// output cannot be worked out from its configuration is an error.
fn output_shape_before(layers: &[&Value], index: usize) -> Result<Vec<Option<u64>>, String> {
    let layer = layers[index];
    let config = &layer["config"];
    let class = layer["class_name"].as_str().unwrap_or("");

    if let Some(units) = config["units"].as_u64().or_else(|| config["output_dim"].as_u64()) {
        return Ok(vec![None, Some(units)]);
    }
    if let Some(target) = config["target_shape"].as_array() {
        let mut shape = vec![None];
        shape.extend(target.iter().map(Value::as_u64));
        return Ok(shape);
    }
    if class == "InputLayer" || SHAPE_PRESERVING.contains(&class) {
        if let Some(shape) = declared_shape(layer) {
            return Ok(shape);
        }
        if index > 0 {
            return output_shape_before(layers, index - 1);
        }
    }
    if class == "Flatten" {
        let input = match declared_shape(layer) {
            Some(shape) => shape,
            None if index > 0 => output_shape_before(layers, index - 1)?,
            None => return Err("Flatten layer has no input shape".to_string()),
        };
        let size = input
            .iter()
            .skip(1)
            .try_fold(1u64, |acc, dim| dim.and_then(|d| acc.checked_mul(d)));
        return match size {
            Some(size) => Ok(vec![None, Some(size)]),
            None => Err("Flatten layer has an input with unknown dimensions".to_string()),
        };
    }

    Err(format!(
        "cannot determine the output shape of layer '{}' ({})",
        layer_name(layer).unwrap_or("?"),
        if class.is_empty() { "unknown class" } else { class }
    ))
}

fn tensor_block(mut shapes: Vec<Vec<Option<u64>>>) -> ArgumentBlock {
    if shapes.len() == 1 {
        return ArgumentBlock::ndarray("Tensor", shapes.remove(0));
    }
    ArgumentBlock::tuple(
        "List of tensors",
        shapes
            .into_iter()
            .map(|shape| ArgumentBlock::ndarray("Tensor", shape))
            .collect(),
    )
}

fn summarize(architecture: &Value, layers: &[&Value]) -> String {
    let rule = "=".repeat(64);
    let model_name = architecture["config"]["name"]
        .as_str()
        .unwrap_or("model");

    let mut lines = vec![
        format!(
            "Model: \"{}\" ({})",
            model_name,
            architecture["class_name"].as_str().unwrap_or("Model")
        ),
        format!("{:<36}{}", "Layer (type)", "Configuration"),
        rule.clone(),
    ];

    for layer in layers {
        let class = layer["class_name"].as_str().unwrap_or("Layer");
        let name = layer_name(layer).unwrap_or("");
        let config = &layer["config"];

        let mut details = Vec::new();
        for key in ["units", "filters", "kernel_size", "rate", "target_shape"] {
            if let Some(value) = config.get(key) {
                details.push(format!("{}={}", key, value));
            }
        }
        if let Some(activation) = config["activation"].as_str() {
            details.push(format!("activation={}", activation));
        }

        lines.push(format!(
            "{:<36}{}",
            format!("{} ({})", name, class),
            details.join(", ")
        ));
    }

    lines.push(rule);
    lines.push(format!("Total layers: {}", layers.len()));
    lines.join("\n") + "\n"
}
