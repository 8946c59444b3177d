// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Verification stage.
//!
//! A single read-only pass over the expanded, folded, classified tree.
//! Every violation is fatal; the pipeline never reaches legalization with a
//! semantically broken program.

use std::collections::{HashMap, HashSet};

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::core::ast::{visit, Node, NodeKind};
use crate::core::isa::{instruction, Reg};

pub fn verify(nodes: &[Node]) -> Result<(), BuildError> {
    let mut detected: HashMap<String, (u32, usize)> = HashMap::new();
    let mut defined: HashSet<String> = HashSet::new();
    let mut first_error: Option<BuildError> = None;

    for node in nodes {
        visit(node, &mut |element| {
            if first_error.is_some() {
                return;
            }
            if let Err(err) = check_element(element, &mut detected, &mut defined) {
                first_error = Some(err);
            }
        });
        if let Some(err) = first_error.take() {
            return Err(err);
        }
    }

    // Every referenced identifier must name a defined label by now; equates
    // and macro parameters were substituted away in expansion.
    let mut missing: Vec<(&String, &(u32, usize))> = detected
        .iter()
        .filter(|(name, _)| !defined.contains(*name))
        .collect();
    if !missing.is_empty() {
        missing.sort_by_key(|(_, pos)| **pos);
        let names: Vec<&str> = missing.iter().map(|(name, _)| name.as_str()).collect();
        let (line, column) = *missing[0].1;
        return Err(BuildError::pos(
            AsmErrorKind::UnresolvedSymbol,
            "Undefined symbols",
            Some(&names.join(", ")),
            line,
            column,
        ));
    }

    Ok(())
}

fn check_element(
    element: &Node,
    detected: &mut HashMap<String, (u32, usize)>,
    defined: &mut HashSet<String>,
) -> Result<(), BuildError> {
    match &element.kind {
        NodeKind::Str(_) => Err(BuildError::new(
            AsmErrorKind::Expression,
            "Strings are not allowed here",
            None,
            element,
        )),
        NodeKind::Identifier(name) => {
            detected
                .entry(name.clone())
                .or_insert((element.line, element.column));
            Ok(())
        }
        NodeKind::Label(name) => {
            defined.insert(name.clone());
            Ok(())
        }
        NodeKind::Data(args) => {
            for arg in args {
                if !arg.integer {
                    return Err(BuildError::new(
                        AsmErrorKind::DirectiveValue,
                        "Data blocks may only contain compile time expressions",
                        None,
                        arg,
                    ));
                }
            }
            Ok(())
        }
        NodeKind::Operation { name, args } => check_operation(element, name, args),
        NodeKind::Org(value) | NodeKind::Bss(value) => {
            match value.as_number() {
                Some(v) if v >= 0 => Ok(()),
                Some(_) => Err(BuildError::new(
                    AsmErrorKind::DirectiveValue,
                    "Directive value must not be negative",
                    None,
                    element,
                )),
                None => Err(BuildError::new(
                    AsmErrorKind::DirectiveValue,
                    "Cannot use label or register relative values here",
                    None,
                    element,
                )),
            }
        }
        NodeKind::Align(value) => match value.as_number() {
            Some(v) if v >= 1 => Ok(()),
            Some(_) => Err(BuildError::new(
                AsmErrorKind::DirectiveValue,
                "Alignment must be at least 1",
                None,
                element,
            )),
            None => Err(BuildError::new(
                AsmErrorKind::DirectiveValue,
                "Cannot use label or register relative values here",
                None,
                element,
            )),
        },
        NodeKind::Include { path, .. } => Err(BuildError::new(
            AsmErrorKind::Assembler,
            "Unresolved include",
            Some(path),
            element,
        )),
        _ => Ok(()),
    }
}

fn check_operation(element: &Node, name: &str, args: &[Node]) -> Result<(), BuildError> {
    let desc = match instruction(name) {
        Some(desc) => desc,
        None => {
            return Err(BuildError::new(
                AsmErrorKind::UnknownOpcode,
                "Unrecognized opcode",
                Some(name),
                element,
            ))
        }
    };

    if desc.operands as usize != args.len() {
        return Err(BuildError::new(
            AsmErrorKind::Arity,
            &format!(
                "Argument count mismatch: {} takes {}, got {}",
                name,
                desc.operands,
                args.len()
            ),
            None,
            element,
        ));
    }

    for (index, arg) in args.iter().enumerate() {
        let last = index == args.len() - 1;
        // Destinations must denote a register or addressable location, and
        // the stack aliases only work in their own direction.
        let bad = if last { Reg::Push } else { Reg::Pop };

        if !last && arg.integer {
            return Err(BuildError::new(
                AsmErrorKind::OperandPosition,
                "Cannot use integer values as a left-hand argument",
                None,
                arg,
            ));
        }

        let mut misused: Option<(u32, usize)> = None;
        visit(arg, &mut |e| {
            if misused.is_none() && e.as_register() == Some(bad) {
                misused = Some((e.line, e.column));
            }
        });
        if let Some((line, column)) = misused {
            return Err(BuildError::pos(
                AsmErrorKind::OperandPosition,
                &format!("Cannot use {} on this instruction", bad.name()),
                None,
                line,
                column,
            ));
        }
    }

    Ok(())
}
