// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Address estimation stage.
//!
//! Walks the instruction stream accumulating a running `[minimum, maximum]`
//! program-counter range in words and snapshots it at every label. An
//! operand's size cost depends on whether its value lands in the compact
//! encodable set, which in turn depends on unresolved label values, so the
//! classifier brute-forces every combination of candidate label values over
//! their current ranges, answering yes (always long), no (never long), or
//! maybe (ambiguous; charged to the maximum only).

use std::collections::HashMap;

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::assembler::fold::flatten;
use crate::core::ast::{collect_identifiers, substitute, BinaryOp, Node, NodeKind, UnaryOp};
use crate::core::isa::{is_compact_literal, mask_word};

/// Inclusive range of program-counter values a label may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Estimate {
    pub minimum: u32,
    pub maximum: u32,
}

impl Estimate {
    pub fn resolved(&self) -> bool {
        self.minimum == self.maximum
    }
}

pub type Estimates = HashMap<String, Estimate>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cost {
    No,
    Maybe,
    Yes,
}

/// One estimation pass.
///
/// `previous` is the table from the prior iteration (absent on the first).
/// With `force` set, ambiguous operand costs are pinned to their pessimistic
/// long form and the operand is flagged `force_long` so the encoder emits
/// the size that was charged. Resolved `align` directives are rewritten to
/// zero-filled data in place.
pub fn estimate(
    nodes: &mut [Node],
    previous: Option<&Estimates>,
    force: bool,
) -> Result<Estimates, BuildError> {
    let mut estimates = Estimates::new();
    let mut minimum: u32 = 0;
    let mut maximum: u32 = 0;

    for node in nodes.iter_mut() {
        let (line, column) = (node.line, node.column);

        if let NodeKind::Align(value) = &node.kind {
            let bias = layout_literal(value, line, column, 1)?;
            let target_min = align_up(minimum, bias);
            let target_max = align_up(maximum, bias);
            if minimum == maximum {
                // Position known: the padding becomes concrete data and the
                // data arm below accounts for it.
                let pad = (target_min - minimum) as usize;
                node.kind = NodeKind::Data(
                    (0..pad)
                        .map(|_| Node::new(NodeKind::Number(0), line, column))
                        .collect(),
                );
            } else {
                minimum = target_min;
                maximum = target_max;
                continue;
            }
        }

        match &mut node.kind {
            NodeKind::Org(value) => {
                let v = layout_literal(value, line, column, 0)?;
                minimum = v;
                maximum = v;
            }
            NodeKind::Bss(value) => {
                let v = layout_literal(value, line, column, 0)?;
                minimum += v;
                maximum += v;
            }
            NodeKind::Data(args) => {
                let len = args.len() as u32;
                minimum += len;
                maximum += len;
            }
            NodeKind::Label(name) => {
                estimates.insert(name.clone(), Estimate { minimum, maximum });
            }
            NodeKind::Operation { args, .. } => {
                minimum += 1;
                maximum += 1;
                for arg in args.iter_mut() {
                    match operand_cost(arg, previous, force) {
                        Cost::Yes => {
                            minimum += 1;
                            maximum += 1;
                        }
                        Cost::Maybe => {
                            maximum += 1;
                        }
                        Cost::No => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(estimates)
}

fn layout_literal(value: &Node, line: u32, column: usize, least: u32) -> Result<u32, BuildError> {
    match value.as_number() {
        Some(v) if v >= least as i64 => Ok(v as u32),
        _ => Err(BuildError::pos(
            AsmErrorKind::DirectiveValue,
            "Directive value must be a literal number",
            None,
            line,
            column,
        )),
    }
}

fn align_up(value: u32, bias: u32) -> u32 {
    let offset = value % bias;
    if offset == 0 {
        value
    } else {
        value + bias - offset
    }
}

fn operand_cost(arg: &mut Node, previous: Option<&Estimates>, force: bool) -> Cost {
    if arg.force_long {
        return Cost::Yes;
    }
    let cost = guess(arg, previous);
    if force && cost == Cost::Maybe {
        arg.force_long = true;
        return Cost::Yes;
    }
    cost
}

/// Does this operand need a trailing immediate word?
fn guess(field: &Node, previous: Option<&Estimates>) -> Cost {
    match &field.kind {
        NodeKind::Register(_) => Cost::No,
        NodeKind::Indirect(value) => {
            if value.is_register() {
                return Cost::No;
            }
            let previous = match previous {
                Some(p) => p,
                None => return Cost::Maybe,
            };
            // Only the non-register term decides between the compact
            // register-indirect form and the offset form.
            let stripped = strip_register(value);
            range(&stripped, &|v| v == 0, previous)
        }
        NodeKind::Binary { .. } | NodeKind::Unary { .. } | NodeKind::Identifier(_) => {
            let previous = match previous {
                Some(p) => p,
                None => return Cost::Maybe,
            };
            range(field, &|v| v <= 30 || v == 0xFFFF, previous)
        }
        NodeKind::Number(v) => {
            if is_compact_literal(*v) {
                Cost::No
            } else {
                Cost::Yes
            }
        }
        _ => Cost::Maybe,
    }
}

/// Drop the register term of an indexed address expression, negating a
/// subtracted offset.
fn strip_register(value: &Node) -> Node {
    if let NodeKind::Binary { op, left, right } = &value.kind {
        if left.is_register() {
            let mut offset = (**right).clone();
            if *op == BinaryOp::Sub {
                offset = Node::synth(
                    NodeKind::Unary {
                        op: UnaryOp::Neg,
                        value: Box::new(offset),
                    },
                    value,
                );
            }
            return offset;
        }
        if right.is_register() {
            return (**left).clone();
        }
    }
    value.clone()
}

/// Brute-force classification of an expression against a compact set.
///
/// Every referenced label steps through its candidate range odometer-style;
/// the scan stops as soon as both a compact and a non-compact result have
/// been seen.
fn range(equation: &Node, desired: &dyn Fn(u16) -> bool, estimates: &Estimates) -> Cost {
    let mut names = Vec::new();
    collect_identifiers(equation, &mut names);
    names.sort();
    names.dedup();

    let mut spans = Vec::with_capacity(names.len());
    for name in names {
        match estimates.get(&name) {
            Some(est) => spans.push((name, *est)),
            None => return Cost::Maybe,
        }
    }

    let mut values: Vec<i64> = spans.iter().map(|(_, est)| est.minimum as i64).collect();
    let mut compact = false;
    let mut long = false;

    loop {
        let mut trial = equation.clone();
        let bindings: HashMap<String, Node> = spans
            .iter()
            .zip(&values)
            .map(|((name, _), v)| {
                (
                    name.clone(),
                    Node::new(NodeKind::Number(*v), equation.line, equation.column),
                )
            })
            .collect();
        substitute(&mut trial, &bindings);

        let outcome = match flatten(&mut trial) {
            Ok(()) => trial.as_number(),
            Err(_) => None,
        };
        match outcome {
            Some(v) if desired(mask_word(v)) => compact = true,
            _ => long = true,
        }
        if compact && long {
            return Cost::Maybe;
        }

        let mut carry = 0;
        while carry < spans.len() {
            values[carry] += 1;
            if values[carry] <= spans[carry].1.maximum as i64 {
                break;
            }
            values[carry] = spans[carry].1.minimum as i64;
            carry += 1;
        }
        if carry >= spans.len() {
            break;
        }
    }

    if compact {
        Cost::No
    } else {
        Cost::Yes
    }
}
