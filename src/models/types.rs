//! Argument descriptors for servable inputs and outputs
//!
//! Every descriptor has a `type` from a closed set plus the fields that type
//! requires:
//!
//! | type            | required field  |
//! |-----------------|-----------------|
//! | `ndarray`       | `shape`         |
//! | `list`          | `item_type`     |
//! | `tuple`         | `element_types` |
//! | `dict`          | `properties`    |
//! | `python object` | `python_type`   |

use crate::error::{DlhubError, DlhubResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared type of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArgumentType {
    Ndarray,
    List,
    Tuple,
    Dict,
    #[serde(rename = "python object")]
    PythonObject,
    String,
    Float,
    Integer,
    Number,
    Boolean,
    File,
}

impl std::fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ndarray => "ndarray",
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Dict => "dict",
            Self::PythonObject => "python object",
            Self::String => "string",
            Self::Float => "float",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::File => "file",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for ArgumentType {
    type Err = DlhubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| DlhubError::InvalidArgument(format!("Unrecognized argument type: {}", s)))
    }
}

/// Description of one input or output argument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentBlock {
    #[serde(rename = "type")]
    pub kind: ArgumentType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tensor shape, `None` entries are unconstrained dimensions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<Vec<Option<u64>>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<Box<ArgumentBlock>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_types: Option<Vec<ArgumentBlock>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, ArgumentBlock>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_type: Option<String>,
}

impl ArgumentBlock {
    fn bare(kind: ArgumentType, description: Option<String>) -> Self {
        Self {
            kind,
            description,
            shape: None,
            item_type: None,
            element_types: None,
            properties: None,
            python_type: None,
        }
    }

    /// A descriptor carrying only its type, as used for nested item types
    pub fn of(kind: ArgumentType) -> Self {
        Self::bare(kind, None)
    }

    /// A scalar argument (`string`, `float`, `integer`, `number`, `boolean`, `file`)
    pub fn scalar(kind: ArgumentType, description: impl Into<String>) -> DlhubResult<Self> {
        let block = Self::bare(kind, Some(description.into()));
        block.validate()?;
        Ok(block)
    }

    pub fn ndarray(description: impl Into<String>, shape: Vec<Option<u64>>) -> Self {
        Self {
            shape: Some(shape),
            ..Self::bare(ArgumentType::Ndarray, Some(description.into()))
        }
    }

    pub fn list(description: impl Into<String>, item_type: ArgumentBlock) -> Self {
        Self {
            item_type: Some(Box::new(item_type)),
            ..Self::bare(ArgumentType::List, Some(description.into()))
        }
    }

    pub fn tuple(description: impl Into<String>, element_types: Vec<ArgumentBlock>) -> Self {
        Self {
            element_types: Some(element_types),
            ..Self::bare(ArgumentType::Tuple, Some(description.into()))
        }
    }

    pub fn dict(
        description: impl Into<String>,
        properties: BTreeMap<String, ArgumentBlock>,
    ) -> Self {
        Self {
            properties: Some(properties),
            ..Self::bare(ArgumentType::Dict, Some(description.into()))
        }
    }

    pub fn python_object(description: impl Into<String>, python_type: impl Into<String>) -> Self {
        Self {
            python_type: Some(python_type.into()),
            ..Self::bare(ArgumentType::PythonObject, Some(description.into()))
        }
    }

    /// Check that the type-specific fields are present, recursively
    pub fn validate(&self) -> DlhubResult<()> {
        let missing = |field: &str| {
            Err(DlhubError::InvalidArgument(format!(
                "Arguments of type '{}' require '{}'",
                self.kind, field
            )))
        };

        match self.kind {
            ArgumentType::Ndarray if self.shape.is_none() => return missing("shape"),
            ArgumentType::List => match &self.item_type {
                Some(item) => item.validate()?,
                None => return missing("item_type"),
            },
            ArgumentType::Tuple => match &self.element_types {
                Some(elements) => {
                    for element in elements {
                        element.validate()?;
                    }
                }
                None => return missing("element_types"),
            },
            ArgumentType::Dict => match &self.properties {
                Some(properties) => {
                    for property in properties.values() {
                        property.validate()?;
                    }
                }
                None => return missing("properties"),
            },
            ArgumentType::PythonObject if self.python_type.is_none() => {
                return missing("python_type");
            }
            _ => {}
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_with_bare_item_type() {
        let block = ArgumentBlock::list("List of numbers", ArgumentBlock::of(ArgumentType::Float));
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({
                "type": "list",
                "description": "List of numbers",
                "item_type": {"type": "float"}
            })
        );
    }

    #[test]
    fn test_ndarray_shape_with_unknown_dims() {
        let block = ArgumentBlock::ndarray("Features", vec![None, Some(4)]);
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "ndarray", "description": "Features", "shape": [null, 4]})
        );
    }

    #[test]
    fn test_python_object_type_name() {
        let block = ArgumentBlock::python_object("A dataframe", "pandas.DataFrame");
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "python object");
        assert_eq!(value["python_type"], "pandas.DataFrame");
    }

    #[test]
    fn test_parse_argument_type() {
        assert_eq!("tuple".parse::<ArgumentType>().unwrap(), ArgumentType::Tuple);
        assert_eq!(
            "python object".parse::<ArgumentType>().unwrap(),
            ArgumentType::PythonObject
        );
        assert!("tensor".parse::<ArgumentType>().is_err());
    }

    #[test]
    fn test_display_matches_serialized_name() {
        for kind in [
            ArgumentType::Ndarray,
            ArgumentType::PythonObject,
            ArgumentType::Boolean,
        ] {
            let serialized = serde_json::to_value(kind).unwrap();
            assert_eq!(serialized, json!(kind.to_string()));
        }
    }

    #[test]
    fn test_scalar_rejects_missing_fields() {
        assert!(ArgumentBlock::scalar(ArgumentType::Float, "A number").is_ok());
        assert!(ArgumentBlock::scalar(ArgumentType::Ndarray, "No shape").is_err());
        assert!(ArgumentBlock::scalar(ArgumentType::List, "No item type").is_err());
    }

    #[test]
    fn test_validate_recurses_into_elements() {
        let bad = ArgumentBlock::tuple("Pair", vec![ArgumentBlock::of(ArgumentType::Ndarray)]);
        assert!(bad.validate().is_err());

        let good = ArgumentBlock::tuple(
            "Pair",
            vec![
                ArgumentBlock::scalar(ArgumentType::Float, "A number").unwrap(),
                ArgumentBlock::scalar(ArgumentType::Float, "A second number").unwrap(),
            ],
        );
        assert!(good.validate().is_ok());
    }

    #[test]
    fn test_deserialized_block_is_validated() {
        let block: ArgumentBlock = serde_json::from_value(json!({"type": "dict"})).unwrap();
        assert!(block.validate().is_err());
    }
}
