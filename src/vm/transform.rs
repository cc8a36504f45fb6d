//! Tree export
//!
//! Converts a node tree into a [`serde_json::Value`] so it can be compared,
//! stored or handed to code that does not know about [`NodeArena`]:
//!
//! ```json
//! {"tag": "Pair", "pos": 0, "len": 3, "children": [
//!   {"label": "key", "node": {"tag": "Name", "pos": 0, "len": 1, "text": "a"}}
//! ]}
//! ```
//!
//! Leaves carry `text` (the matched input, lossily decoded as UTF-8) or
//! `value` when a replacement was logged. Inner nodes carry `children`;
//! an empty label is exported as `null`.

use super::node::{NodeArena, NodeId};
use super::program::{Program, NO_TAG};
use serde_json::{json, Map, Value};

/// Export the tree rooted at `root`
pub fn node_to_value(root: NodeId, arena: &NodeArena, program: &Program, input: &[u8]) -> Value {
    let node = arena.node(root);
    let mut obj = Map::new();
    obj.insert("tag".into(), json!(program.tag_name(node.tag())));
    obj.insert("pos".into(), json!(node.start()));
    obj.insert("len".into(), json!(node.span_len()));

    if let Some(value) = node.value() {
        obj.insert(
            "value".into(),
            json!(String::from_utf8_lossy(program.string(value))),
        );
    }

    let children: Vec<Value> = node
        .children()
        .edges()
        .map(|edge| {
            let label = if edge.label == NO_TAG {
                Value::Null
            } else {
                json!(program.tag_name(edge.label))
            };
            json!({
                "label": label,
                "node": node_to_value(edge.node, arena, program, input),
            })
        })
        .collect();

    if children.is_empty() {
        if node.value().is_none() {
            obj.insert(
                "text".into(),
                json!(String::from_utf8_lossy(node.text(input))),
            );
        }
    } else {
        obj.insert("children".into(), Value::Array(children));
    }
    Value::Object(obj)
}

/// Export the tree rooted at `root` as a JSON string
pub fn node_to_json(root: NodeId, arena: &NodeArena, program: &Program, input: &[u8]) -> String {
    node_to_value(root, arena, program, input).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::assembler::ProgramBuilder;

    #[test]
    fn test_export_shape() {
        let mut b = ProgramBuilder::new();
        let l = b.label_here();
        b.entry(l);
        b.ret();
        let pair = b.tag("Pair");
        let name = b.tag("Name");
        let key = b.tag("key");
        let t = b.string(b"true");
        let program = b.build().unwrap();

        let input = b"a=1";
        let mut arena = NodeArena::new();
        let root = arena.alloc(pair, 0, 3, 2, None);
        let left = arena.alloc(name, 0, 1, 0, None);
        let right = arena.alloc(name, 2, 1, 0, Some(t));
        arena.set(root, 0, key, left);
        arena.set(root, 1, NO_TAG, right);

        let value = node_to_value(root, &arena, &program, input);
        assert_eq!(
            value,
            json!({
                "tag": "Pair", "pos": 0, "len": 3,
                "children": [
                    {"label": "key", "node": {"tag": "Name", "pos": 0, "len": 1, "text": "a"}},
                    {"label": null, "node": {"tag": "Name", "pos": 2, "len": 1, "value": "true"}}
                ]
            })
        );
    }
}
