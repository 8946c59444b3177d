// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! AST rendering: back to source text for diagnostics, and to JSON for the
//! `--ast` dump.

use serde_json::{json, Value};

use crate::core::ast::{IncludeFormat, Node, NodeKind, Reorder};

/// Render one statement-level node back to source text.
pub fn source(node: &Node) -> String {
    match &node.kind {
        NodeKind::Label(name) => format!(":{name}"),
        NodeKind::Operation { name, args } => {
            format!("\t{} {}", name, join_exprs(args))
        }
        NodeKind::Data(args) => format!("\tDAT {}", join_exprs(args)),
        NodeKind::Org(value) => format!("\t.org {}", expr(value)),
        NodeKind::Align(value) => format!("\t.align {}", expr(value)),
        NodeKind::Bss(value) => format!("\t.bss {}", expr(value)),
        NodeKind::Equate { name, value } => format!("\t.equ {name}, {}", expr(value)),
        NodeKind::MacroDef {
            name,
            params,
            contents,
        } => {
            let mut out = format!("\t.macro {name}({})", params.join(", "));
            for item in contents {
                out.push('\n');
                out.push_str(&source(item));
            }
            out.push_str("\n\t.endmacro");
            out
        }
        NodeKind::Proc(contents) => {
            let mut out = "\t.proc".to_string();
            for item in contents {
                out.push('\n');
                out.push_str(&source(item));
            }
            out.push_str("\n\t.endproc");
            out
        }
        NodeKind::Include { format, path } => match format {
            IncludeFormat::Source => format!("\t.include {path:?}"),
            IncludeFormat::Binary => format!("\t.include bin {path:?}"),
        },
        _ => expr(node),
    }
}

pub fn source_all(nodes: &[Node]) -> String {
    nodes.iter().map(source).collect::<Vec<_>>().join("\n")
}

fn join_exprs(args: &[Node]) -> String {
    args.iter().map(expr).collect::<Vec<_>>().join(", ")
}

fn expr(node: &Node) -> String {
    match &node.kind {
        NodeKind::Number(value) => value.to_string(),
        NodeKind::Identifier(name) => name.clone(),
        NodeKind::Register(reg) => reg.name().to_string(),
        NodeKind::Str(text) => format!("{text:?}"),
        NodeKind::Paren(inner) => format!("({})", expr(inner)),
        NodeKind::Unary { op, value } => format!("{}{}", op.symbol(), term(value)),
        NodeKind::Binary { op, left, right } => {
            format!("{} {} {}", term(left), op.symbol(), term(right))
        }
        NodeKind::Unordered { link, left, right } => {
            format!("{} {} {}", term(left), link.op.symbol(), term(right))
        }
        NodeKind::Indirect(inner) => format!("[{}]", expr(inner)),
        other => format!("<{other:?}>"),
    }
}

/// Sub-expression rendering: wrap nested operator nodes so the printed
/// grouping matches the tree.
fn term(node: &Node) -> String {
    match &node.kind {
        NodeKind::Binary { .. } | NodeKind::Unordered { .. } => format!("({})", expr(node)),
        _ => expr(node),
    }
}

/// JSON value for the `--ast` dump, in the source AST's vocabulary.
pub fn to_json(node: &Node) -> Value {
    let mut value = match &node.kind {
        NodeKind::Number(v) => json!({ "type": "number", "value": v }),
        NodeKind::Identifier(name) => json!({ "type": "identifier", "name": name }),
        NodeKind::Register(reg) => json!({ "type": "register", "name": reg.name() }),
        NodeKind::Str(text) => json!({ "type": "string", "value": text }),
        NodeKind::Label(name) => json!({ "type": "label", "name": name }),
        NodeKind::Paren(inner) => json!({ "type": "paren", "value": to_json(inner) }),
        NodeKind::Unary { op, value } => json!({
            "type": "unary",
            "operation": op.symbol(),
            "value": to_json(value),
        }),
        NodeKind::Binary { op, left, right } => json!({
            "type": "binary",
            "operation": op.symbol(),
            "left": to_json(left),
            "right": to_json(right),
        }),
        NodeKind::Unordered { link, left, right } => json!({
            "type": "unordered",
            "operation": link.op.symbol(),
            "priority": link.priority,
            "reorder": match link.reorder {
                Reorder::None => "none",
                Reorder::Partial => "partial",
                Reorder::Full => "full",
            },
            "inverse": link.inverse.map(|op| op.symbol()),
            "left": to_json(left),
            "right": to_json(right),
        }),
        NodeKind::Indirect(inner) => json!({ "type": "indirect", "value": to_json(inner) }),
        NodeKind::Operation { name, args } => json!({
            "type": "operation",
            "name": name,
            "arguments": args.iter().map(to_json).collect::<Vec<_>>(),
        }),
        NodeKind::Data(args) => json!({
            "type": "data",
            "arguments": args.iter().map(to_json).collect::<Vec<_>>(),
        }),
        NodeKind::Org(value) => json!({ "type": "org", "value": to_json(value) }),
        NodeKind::Align(value) => json!({ "type": "align", "value": to_json(value) }),
        NodeKind::Bss(value) => json!({ "type": "bss", "value": to_json(value) }),
        NodeKind::Equate { name, value } => json!({
            "type": "equate",
            "name": name,
            "value": to_json(value),
        }),
        NodeKind::MacroDef {
            name,
            params,
            contents,
        } => json!({
            "type": "macro",
            "name": name,
            "parameters": params,
            "contents": contents.iter().map(to_json).collect::<Vec<_>>(),
        }),
        NodeKind::Proc(contents) => json!({
            "type": "proc",
            "contents": contents.iter().map(to_json).collect::<Vec<_>>(),
        }),
        NodeKind::Include { format, path } => json!({
            "type": "include",
            "format": match format {
                IncludeFormat::Source => "source",
                IncludeFormat::Binary => "binary",
            },
            "path": path,
        }),
    };
    if let Value::Object(map) = &mut value {
        map.insert("line".to_string(), json!(node.line));
        map.insert("column".to_string(), json!(node.column));
    }
    value
}

pub fn to_json_all(nodes: &[Node]) -> Value {
    Value::Array(nodes.iter().map(to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::parse_program;

    #[test]
    fn statements_render_back_to_source() {
        let nodes = parse_program(":start SET A, [B + 2]\nDAT 1, 2").expect("parse");
        let text = source_all(&nodes);
        assert_eq!(text, ":start\n\tSET A, [B + 2]\n\tDAT 1, 2");
    }

    #[test]
    fn nested_expressions_keep_grouping() {
        let mut nodes = parse_program("SET A, [v] + 1").expect("parse");
        crate::assembler::balance::balance_program(&mut nodes);
        assert_eq!(source_all(&nodes), "\tSET A, [v] + 1");
    }

    #[test]
    fn ast_json_shape() {
        let nodes = parse_program("SET A, 5").expect("parse");
        let value = to_json_all(&nodes);
        assert_eq!(value[0]["type"], "operation");
        assert_eq!(value[0]["name"], "SET");
        assert_eq!(value[0]["arguments"][0]["type"], "register");
        assert_eq!(value[0]["arguments"][1]["value"], 5);
        assert_eq!(value[0]["line"], 1);
    }

    #[test]
    fn unordered_json_carries_chain_metadata() {
        let nodes = parse_program("DAT 1 - 2").expect("parse");
        let value = to_json_all(&nodes);
        let chain = &value[0]["arguments"][0];
        assert_eq!(chain["type"], "unordered");
        assert_eq!(chain["operation"], "-");
        assert_eq!(chain["reorder"], "partial");
        assert_eq!(chain["inverse"], "+");
    }
}
