//! Test cases
//!
//! A test case pairs a pipeline input with an [`ExpectedNode`] tree that
//! mirrors the pipeline's shape and optionally carries expected outputs for
//! any node.

mod filter;
mod loader;
mod validator;

pub use filter::{FilterError, TagFilter};
pub use loader::{LoadError, load_test_cases, sha256_hex, test_case_files, test_case_id};
pub use validator::{FieldError, ShapeValidator, TestCaseValidator, ValidationError};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::link::LinkKind;

/// Expected shape and outputs for one node of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExpectedNode {
    Model {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<Value>,
    },
    Sequence {
        left: Box<ExpectedNode>,
        right: Box<ExpectedNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<Value>,
    },
    Mux {
        children: Vec<ExpectedNode>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expected: Option<Value>,
    },
}

impl ExpectedNode {
    pub fn model(name: impl Into<String>) -> Self {
        ExpectedNode::Model {
            name: name.into(),
            expected: None,
        }
    }

    pub fn sequence(left: ExpectedNode, right: ExpectedNode) -> Self {
        ExpectedNode::Sequence {
            left: Box::new(left),
            right: Box::new(right),
            expected: None,
        }
    }

    pub fn mux(children: Vec<ExpectedNode>) -> Self {
        ExpectedNode::Mux {
            children,
            expected: None,
        }
    }

    /// Attach an expected output to this node
    pub fn expect(mut self, value: impl Into<Value>) -> Self {
        let slot = match &mut self {
            ExpectedNode::Model { expected, .. }
            | ExpectedNode::Sequence { expected, .. }
            | ExpectedNode::Mux { expected, .. } => expected,
        };
        *slot = Some(value.into());
        self
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            ExpectedNode::Model { .. } => LinkKind::Model,
            ExpectedNode::Sequence { .. } => LinkKind::Sequence,
            ExpectedNode::Mux { .. } => LinkKind::Mux,
        }
    }

    pub fn expected(&self) -> Option<&Value> {
        match self {
            ExpectedNode::Model { expected, .. }
            | ExpectedNode::Sequence { expected, .. }
            | ExpectedNode::Mux { expected, .. } => expected.as_ref(),
        }
    }
}

/// A loaded test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// Path of the source file relative to the input folder, without extension
    pub test_case_id: String,

    /// Hex SHA-256 of the source file's bytes
    pub sha256: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    pub input: Value,

    pub expected: ExpectedNode,
}

/// Test case as authored on disk, before the loader assigns identity
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TestCaseFile {
    #[serde(default)]
    pub tags: Vec<String>,
    pub input: Value,
    pub expected: ExpectedNode,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expected_node_from_yaml() {
        let yaml = r#"
type: sequence
left:
  type: model
  name: wordcount
  expected: 2
right:
  type: model
  name: greeter
  expected: hello hello
"#;
        let node: ExpectedNode = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            node,
            ExpectedNode::sequence(
                ExpectedNode::model("wordcount").expect(2),
                ExpectedNode::model("greeter").expect("hello hello"),
            )
        );
    }

    #[test]
    fn test_absent_expected_is_omitted() {
        let node = ExpectedNode::mux(vec![ExpectedNode::model("a")]);
        assert_eq!(
            serde_json::to_value(&node).unwrap(),
            json!({"type": "mux", "children": [{"type": "model", "name": "a"}]})
        );
        assert_eq!(node.kind(), LinkKind::Mux);
        assert!(node.expected().is_none());
    }
}
