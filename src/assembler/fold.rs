// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Classifier and constant folder.
//!
//! `flatten_program` folds literal subtrees into single numbers using the
//! machine-independent 32-bit semantics of the source expression language,
//! unwraps parentheses, and expands data-block strings into words.
//! `mark_program` then tags every subtree with the `integer` flag: whether
//! it resolves to a compile-time constant.

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::core::ast::{walk_mut, walk_seq, BinaryOp, Node, NodeKind, UnaryOp};

/// Fold constants bottom-up across the whole program.
pub fn flatten_program(nodes: &mut [Node]) -> Result<(), BuildError> {
    for node in nodes.iter_mut() {
        expand_data_strings(node);
        flatten(node)?;
    }
    Ok(())
}

/// Data blocks accept strings; each character becomes one word.
fn expand_data_strings(node: &mut Node) {
    if let NodeKind::Data(args) = &mut node.kind {
        let mut expanded = Vec::with_capacity(args.len());
        for arg in args.drain(..) {
            match &arg.kind {
                NodeKind::Str(text) => {
                    for ch in text.chars() {
                        expanded.push(Node::number(ch as i64, &arg));
                    }
                }
                _ => expanded.push(arg),
            }
        }
        *args = expanded;
    }
}

/// Fold one tree in place.
pub fn flatten(node: &mut Node) -> Result<(), BuildError> {
    let mut error: Option<BuildError> = None;
    walk_mut(node, &mut |n| {
        if error.is_some() {
            return None;
        }
        match fold_node(n) {
            Ok(replacement) => replacement,
            Err(e) => {
                error = Some(e);
                None
            }
        }
    });
    match error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn fold_node(node: &mut Node) -> Result<Option<Node>, BuildError> {
    let (line, column) = (node.line, node.column);
    let number = |value: i64| Node::new(NodeKind::Number(value), line, column);

    match &mut node.kind {
        NodeKind::Str(_) => Err(BuildError::pos(
            AsmErrorKind::Expression,
            "Strings are not allowed here",
            None,
            line,
            column,
        )),
        NodeKind::Paren(inner) => {
            let unwrapped = std::mem::replace(inner.as_mut(), Node::new(NodeKind::Number(0), 0, 0));
            Ok(Some(unwrapped))
        }
        NodeKind::Binary { op, left, right } => {
            if *op == BinaryOp::Pack {
                // Byte-pack lowers to ((left & 0xFF) | (right << 8)); the
                // rewrite folds further if the halves are literal.
                let l = std::mem::replace(left.as_mut(), Node::new(NodeKind::Number(0), 0, 0));
                let r = std::mem::replace(right.as_mut(), Node::new(NodeKind::Number(0), 0, 0));
                let low = Node::new(
                    NodeKind::Binary {
                        op: BinaryOp::BitAnd,
                        right: Box::new(number(0xFF)),
                        left: Box::new(l),
                    },
                    line,
                    column,
                );
                let high = Node::new(
                    NodeKind::Binary {
                        op: BinaryOp::Shl,
                        right: Box::new(number(8)),
                        left: Box::new(r),
                    },
                    line,
                    column,
                );
                let mut packed = Node::new(
                    NodeKind::Binary {
                        op: BinaryOp::BitOr,
                        left: Box::new(low),
                        right: Box::new(high),
                    },
                    line,
                    column,
                );
                flatten(&mut packed)?;
                return Ok(Some(packed));
            }
            match (left.as_number(), right.as_number()) {
                (Some(l), Some(r)) => {
                    let value = eval_binary(*op, l, r).map_err(|msg| {
                        BuildError::pos(AsmErrorKind::Expression, msg, None, line, column)
                    })?;
                    Ok(Some(number(value)))
                }
                _ => Ok(None),
            }
        }
        NodeKind::Unary { op, value } => match value.as_number() {
            Some(v) => Ok(Some(number(eval_unary(*op, v)))),
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

/// Fold a binary operator over two literals.
///
/// Division floors toward negative infinity; shifts and bitwise operators
/// run in the 32-bit domain of the source expression language; `&&`/`||`
/// select an operand value rather than producing a boolean.
pub fn eval_binary(op: BinaryOp, l: i64, r: i64) -> Result<i64, &'static str> {
    let value = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Sub => l.wrapping_sub(r),
        BinaryOp::Mul => l.wrapping_mul(r),
        BinaryOp::Div => {
            if r == 0 {
                return Err("Division by zero");
            }
            let q = l.wrapping_div(r);
            if l % r != 0 && (l < 0) != (r < 0) {
                q - 1
            } else {
                q
            }
        }
        BinaryOp::Mod => {
            if r == 0 {
                return Err("Modulo by zero");
            }
            l.wrapping_rem(r)
        }
        BinaryOp::Shl => ((l as i32).wrapping_shl((r & 0x1f) as u32)) as i64,
        BinaryOp::Shr => ((l as i32).wrapping_shr((r & 0x1f) as u32)) as i64,
        BinaryOp::UShr => ((l as u32).wrapping_shr((r & 0x1f) as u32)) as i64,
        BinaryOp::BitAnd => ((l as i32) & (r as i32)) as i64,
        BinaryOp::BitOr => ((l as i32) | (r as i32)) as i64,
        BinaryOp::BitXor => ((l as i32) ^ (r as i32)) as i64,
        BinaryOp::LogicAnd => {
            if l != 0 {
                r
            } else {
                l
            }
        }
        BinaryOp::LogicOr => {
            if l != 0 {
                l
            } else {
                r
            }
        }
        BinaryOp::Pack => ((l as i32 & 0xFF) | (r as i32).wrapping_shl(8)) as i64,
    };
    Ok(value)
}

/// Fold a unary operator over a literal. Address-of deliberately passes
/// its operand through unchanged; the machine has no compile-time address
/// operator and the downstream stages rely on this identity.
pub fn eval_unary(op: UnaryOp, v: i64) -> i64 {
    match op {
        UnaryOp::Neg => v.wrapping_neg(),
        UnaryOp::Not => (!(v as i32)) as i64,
        UnaryOp::AddrOf => v,
    }
}

/// Assign the `integer` flag bottom-up across the whole program.
pub fn mark_program(nodes: &mut [Node]) {
    walk_seq(nodes, &mut |n| {
        let integer = match &n.kind {
            NodeKind::Indirect(_) => false,
            NodeKind::Identifier(_) | NodeKind::Number(_) => true,
            NodeKind::Binary { left, right, .. } => left.integer && right.integer,
            NodeKind::Unary { op, value } => *op != UnaryOp::AddrOf && value.integer,
            _ => return None,
        };
        n.integer = integer;
        None
    });
}
