use serde_json::{Map, Value};

/// Structural view of a JSON value: one recursive case per variant.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Scalar(&'a Value),
    Sequence(&'a [Value]),
    Mapping(&'a Map<String, Value>),
}

impl<'a> Node<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Node::Sequence(items),
            Value::Object(map) => Node::Mapping(map),
            scalar => Node::Scalar(scalar),
        }
    }
}
