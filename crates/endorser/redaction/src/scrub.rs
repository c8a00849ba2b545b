use crate::walk::Node;
use endorser_types::{hidden_key, is_hidden_sentinel, is_identifier_shaped, HIDDEN_SENTINEL};
use endorser_visibility::VisibleSet;
use serde_json::{Map, Value};

/// A scrubbed value and how many identifiers were replaced to produce it.
#[derive(Debug, Clone, PartialEq)]
pub struct Scrubbed {
    pub value: Value,
    pub hidden: usize,
}

impl Scrubbed {
    pub fn altered(&self) -> bool {
        self.hidden > 0
    }
}

pub fn scrub(visible: &VisibleSet, value: &Value) -> Value {
    scrub_with_report(visible, value).value
}

pub fn scrub_with_report(visible: &VisibleSet, value: &Value) -> Scrubbed {
    let mut hidden = 0;
    let value = scrub_node(visible, Node::of(value), &mut hidden);
    Scrubbed { value, hidden }
}

fn scrub_node(visible: &VisibleSet, node: Node<'_>, hidden: &mut usize) -> Value {
    match node {
        Node::Scalar(Value::String(text)) if must_hide(visible, text) => {
            *hidden += 1;
            Value::String(HIDDEN_SENTINEL.to_string())
        }
        Node::Scalar(scalar) => scalar.clone(),
        Node::Sequence(items) => Value::Array(
            items
                .iter()
                .map(|item| scrub_node(visible, Node::of(item), hidden))
                .collect(),
        ),
        Node::Mapping(map) => {
            let mut out = Map::new();
            for (position, (key, item)) in map.iter().enumerate() {
                let key = if must_hide(visible, key) {
                    *hidden += 1;
                    free_hidden_key(map, &out, position)
                } else {
                    key.clone()
                };
                out.insert(key, scrub_node(visible, Node::of(item), hidden));
            }
            Value::Object(out)
        }
    }
}

/// First indexed sentinel from `position` on that neither the input nor the
/// output already uses as a key.
fn free_hidden_key(
    input: &Map<String, Value>,
    output: &Map<String, Value>,
    position: usize,
) -> String {
    (position..)
        .map(hidden_key)
        .find(|key| !input.contains_key(key) && !output.contains_key(key))
        .unwrap_or_else(|| HIDDEN_SENTINEL.to_string())
}

fn must_hide(visible: &VisibleSet, text: &str) -> bool {
    is_identifier_shaped(text) && !is_hidden_sentinel(text) && !visible.can_see(text)
}

/// Identifier-shaped scalars in traversal order, duplicates kept. Mapping
/// keys are not reported.
pub fn all_identifiers_inside(value: &Value) -> Vec<String> {
    let mut found = Vec::new();
    collect(Node::of(value), &mut found);
    found
}

fn collect(node: Node<'_>, found: &mut Vec<String>) {
    match node {
        Node::Scalar(Value::String(text)) if is_identifier_shaped(text) => {
            found.push(text.clone());
        }
        Node::Scalar(_) => {}
        Node::Sequence(items) => items.iter().for_each(|item| collect(Node::of(item), found)),
        Node::Mapping(map) => map.values().for_each(|item| collect(Node::of(item), found)),
    }
}
