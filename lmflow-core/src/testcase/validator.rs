//! Test case validation derived from a pipeline's structure
//!
//! The validator mirrors the link tree: model nodes require the link's name as
//! a literal, sequence nodes require both sides, and each element of a mux's
//! `children` must match one of the mux's declared children. Every problem is
//! reported with the path of the offending field.

use serde_json::Value;
use std::fmt;

use crate::link::{Link, LinkKind, TypeCheck};

/// A problem with one field of a test case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted path, e.g. `expected.left.name`
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// A test case failed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    /// True when any error sits at or below `path`
    pub fn mentions(&self, path: &str) -> bool {
        self.errors.iter().any(|e| e.path.starts_with(path))
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "  {}", error)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Validator for an expected-node tree
#[derive(Debug, Clone)]
pub enum ShapeValidator {
    Model {
        name: String,
        output: TypeCheck,
    },
    Sequence {
        left: Box<ShapeValidator>,
        right: Box<ShapeValidator>,
        output: TypeCheck,
    },
    Mux {
        children: Vec<ShapeValidator>,
        output: TypeCheck,
    },
}

impl ShapeValidator {
    pub fn for_link(link: &Link) -> Self {
        match link {
            Link::Model(model) => ShapeValidator::Model {
                name: model.name.clone(),
                output: model.output.clone(),
            },
            Link::Sequence(sequence) => ShapeValidator::Sequence {
                left: Box::new(Self::for_link(&sequence.left)),
                right: Box::new(Self::for_link(&sequence.right)),
                output: sequence.output.clone(),
            },
            Link::Mux(mux) => ShapeValidator::Mux {
                children: mux.children.iter().map(|c| Self::for_link(c)).collect(),
                output: mux.output.clone(),
            },
        }
    }

    pub fn kind(&self) -> LinkKind {
        match self {
            ShapeValidator::Model { .. } => LinkKind::Model,
            ShapeValidator::Sequence { .. } => LinkKind::Sequence,
            ShapeValidator::Mux { .. } => LinkKind::Mux,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ShapeValidator::Model { name, .. } => format!("model \"{}\"", name),
            other => other.kind().to_string(),
        }
    }

    fn output(&self) -> &TypeCheck {
        match self {
            ShapeValidator::Model { output, .. }
            | ShapeValidator::Sequence { output, .. }
            | ShapeValidator::Mux { output, .. } => output,
        }
    }

    /// Validate `value` at `path`, appending every problem found
    pub fn validate(&self, value: &Value, path: &str, errors: &mut Vec<FieldError>) {
        let Some(object) = value.as_object() else {
            errors.push(FieldError::new(
                path,
                format!("expected {}, found {}", self.describe(), describe_value(value)),
            ));
            return;
        };

        let kind = self.kind().as_str();
        match object.get("type") {
            Some(Value::String(found)) if found == kind => {}
            Some(found) => {
                errors.push(FieldError::new(
                    format!("{}.type", path),
                    format!("expected \"{}\", found {}", kind, found),
                ));
                return;
            }
            None => {
                errors.push(FieldError::new(
                    format!("{}.type", path),
                    format!("missing field, expected \"{}\"", kind),
                ));
                return;
            }
        }

        if let Some(expected) = object.get("expected").filter(|v| !v.is_null()) {
            let output = self.output();
            if let Err(message) = output.check(expected) {
                errors.push(FieldError::new(
                    format!("{}.expected", path),
                    format!("expected {}: {}", output.type_name(), message),
                ));
            }
        }

        match self {
            ShapeValidator::Model { name, .. } => {
                let field = format!("{}.name", path);
                match object.get("name") {
                    Some(Value::String(found)) if found == name => {}
                    Some(Value::String(found)) => errors.push(FieldError::new(
                        field,
                        format!("expected \"{}\", found \"{}\"", name, found),
                    )),
                    Some(found) => errors.push(FieldError::new(
                        field,
                        format!("expected \"{}\", found {}", name, found),
                    )),
                    None => errors.push(FieldError::new(
                        field,
                        format!("missing field, expected \"{}\"", name),
                    )),
                }
            }
            ShapeValidator::Sequence { left, right, .. } => {
                for (side, validator) in [("left", left), ("right", right)] {
                    let field = format!("{}.{}", path, side);
                    match object.get(side) {
                        Some(child) => validator.validate(child, &field, errors),
                        None => errors.push(FieldError::new(
                            field,
                            format!("missing field, expected {}", validator.describe()),
                        )),
                    }
                }
            }
            ShapeValidator::Mux { children, .. } => {
                let field = format!("{}.children", path);
                match object.get("children") {
                    Some(Value::Array(items)) => {
                        for (i, item) in items.iter().enumerate() {
                            validate_mux_child(children, item, &format!("{}[{}]", field, i), errors);
                        }
                    }
                    Some(found) => errors.push(FieldError::new(
                        field,
                        format!("expected an array, found {}", describe_value(found)),
                    )),
                    None => errors.push(FieldError::new(field, "missing field")),
                }
            }
        }
    }

    /// Same node kind and, for models, same name
    fn identifies(&self, value: &Value) -> bool {
        let kind = value.get("type").and_then(Value::as_str);
        if kind != Some(self.kind().as_str()) {
            return false;
        }
        match self {
            ShapeValidator::Model { name, .. } => {
                value.get("name").and_then(Value::as_str) == Some(name.as_str())
            }
            _ => true,
        }
    }
}

fn validate_mux_child(
    candidates: &[ShapeValidator],
    item: &Value,
    path: &str,
    errors: &mut Vec<FieldError>,
) {
    let mut closest: Option<Vec<FieldError>> = None;
    for candidate in candidates {
        let mut attempt = Vec::new();
        candidate.validate(item, path, &mut attempt);
        if attempt.is_empty() {
            return;
        }
        if closest.is_none() && candidate.identifies(item) {
            closest = Some(attempt);
        }
    }

    match closest {
        Some(found) => errors.extend(found),
        None if candidates.is_empty() => {
            errors.push(FieldError::new(path, "mux declares no children"))
        }
        None => {
            let expected = candidates
                .iter()
                .map(ShapeValidator::describe)
                .collect::<Vec<_>>()
                .join(", ");
            errors.push(FieldError::new(
                path,
                format!(
                    "found {}, expected one of the mux's children: {}",
                    describe_value(item),
                    expected
                ),
            ));
        }
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::Object(object) => {
            let kind = object.get("type").and_then(Value::as_str);
            let name = object.get("name").and_then(Value::as_str);
            match (kind, name) {
                (Some(kind), Some(name)) => format!("{} \"{}\"", kind, name),
                (Some(kind), None) => kind.to_string(),
                _ => "an object".to_string(),
            }
        }
        Value::Array(_) => "an array".to_string(),
        Value::String(s) => format!("\"{}\"", s),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Validator for whole test case documents
#[derive(Debug, Clone)]
pub struct TestCaseValidator {
    input: TypeCheck,
    expected: ShapeValidator,
}

impl TestCaseValidator {
    pub fn for_link(link: &Link) -> Self {
        Self {
            input: link.input_check().clone(),
            expected: ShapeValidator::for_link(link),
        }
    }

    pub fn shape(&self) -> &ShapeValidator {
        &self.expected
    }

    pub fn validate(&self, document: &Value) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        let Some(object) = document.as_object() else {
            errors.push(FieldError::new(
                "$",
                format!("expected a test case object, found {}", describe_value(document)),
            ));
            return Err(ValidationError { errors });
        };

        match object.get("input") {
            Some(input) => {
                if let Err(message) = self.input.check(input) {
                    errors.push(FieldError::new(
                        "input",
                        format!("expected {}: {}", self.input.type_name(), message),
                    ));
                }
            }
            None => errors.push(FieldError::new("input", "missing field")),
        }

        match object.get("expected") {
            Some(expected) => self.expected.validate(expected, "expected", &mut errors),
            None => errors.push(FieldError::new(
                "expected",
                format!("missing field, expected {}", self.expected.describe()),
            )),
        }

        if let Some(tags) = object.get("tags") {
            let valid = tags
                .as_array()
                .is_some_and(|tags| tags.iter().all(Value::is_string));
            if !valid {
                errors.push(FieldError::new("tags", "expected a list of strings"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { errors })
        }
    }
}
