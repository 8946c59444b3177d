// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Instruction encoding stage.
//!
//! Operand field layout (DCPU-16): registers use their fixed codes,
//! `[reg]` is `0x08+code` (`0x19` for SP), `[reg +/- literal]` is
//! `0x10+code` (`0x1a` for SP) with a trailing immediate, `[literal]` is
//! `0x1e` + immediate, long literals are `0x1f` + immediate, and compact
//! literals pack into the field itself as `((value+1) & 0x1F) + 0x20`.
//! The instruction word is `(a << 10) | (b << 5) | opcode`, followed by
//! `a`'s immediate, then `b`'s.

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::core::ast::{contains_identifier, BinaryOp, Node, NodeKind};
use crate::core::isa::{instruction, mask_word, Reg};

struct FieldEnc {
    field: u16,
    immediate: Option<u16>,
}

/// Convert every fully resolved instruction (and `bss` block) into a
/// `data` node holding its machine words. Nodes still referencing labels
/// are left for a later relaxation iteration.
pub fn assemble_ready(nodes: &mut [Node]) -> Result<(), BuildError> {
    for node in nodes.iter_mut() {
        let (line, column) = (node.line, node.column);
        let words = match &node.kind {
            NodeKind::Bss(value) if !contains_identifier(node) => match value.as_number() {
                Some(len) if len >= 0 => vec![0u16; len as usize],
                _ => {
                    return Err(BuildError::pos(
                        AsmErrorKind::DirectiveValue,
                        "Directive value must be a literal number",
                        None,
                        line,
                        column,
                    ))
                }
            },
            NodeKind::Operation { name, args } if !contains_identifier(node) => {
                encode_instruction(name, args, line, column)?
            }
            _ => continue,
        };
        node.kind = NodeKind::Data(
            words
                .into_iter()
                .map(|w| Node::new(NodeKind::Number(w as i64), line, column))
                .collect(),
        );
    }
    Ok(())
}

fn encode_instruction(
    name: &str,
    args: &[Node],
    line: u32,
    column: usize,
) -> Result<Vec<u16>, BuildError> {
    let desc = match instruction(name) {
        Some(desc) => desc,
        None => {
            return Err(BuildError::pos(
                AsmErrorKind::UnknownOpcode,
                "Unrecognized opcode",
                Some(name),
                line,
                column,
            ))
        }
    };

    let mut fields = Vec::with_capacity(args.len());
    for arg in args {
        fields.push(encode_field(arg)?);
    }

    // One-operand instructions put their sole argument in `a` and the
    // special opcode in `b`; two-operand ones put the first argument in
    // `b` and the second in `a`.
    let (opcode, b_field, a_field, a_immediate, b_immediate) = if desc.operands == 1 {
        (0u16, desc.opcode, fields[0].field, fields[0].immediate, None)
    } else {
        (
            desc.opcode,
            fields[0].field,
            fields[1].field,
            fields[1].immediate,
            fields[0].immediate,
        )
    };

    let mut words = vec![(a_field << 10) | (b_field << 5) | opcode];
    if let Some(imm) = a_immediate {
        words.push(imm);
    }
    if let Some(imm) = b_immediate {
        words.push(imm);
    }
    Ok(words)
}

/// Encode one operand into a field plus optional trailing immediate.
fn encode_field(expression: &Node) -> Result<FieldEnc, BuildError> {
    match &expression.kind {
        NodeKind::Number(v) => {
            let masked = mask_word(*v);
            if (masked <= 30 || masked == 0xFFFF) && !expression.force_long {
                Ok(FieldEnc {
                    field: (((masked as u32 + 1) & 0x1F) as u16) + 0x20,
                    immediate: None,
                })
            } else {
                Ok(FieldEnc {
                    field: 0x1F,
                    immediate: Some(masked),
                })
            }
        }
        NodeKind::Register(reg) => Ok(FieldEnc {
            field: reg.field_code(),
            immediate: None,
        }),
        NodeKind::Indirect(inner) => {
            let (reg, value) = match &inner.kind {
                NodeKind::Register(reg) => (*reg, 0i64),
                NodeKind::Number(v) => {
                    return Ok(FieldEnc {
                        field: 0x1E,
                        immediate: Some(mask_word(*v)),
                    })
                }
                NodeKind::Binary { op, left, right } => {
                    let (reg, mut value) = if let Some(reg) = left.as_register() {
                        match right.as_number() {
                            Some(v) => (reg, v),
                            None => return Err(unencodable(expression)),
                        }
                    } else if let Some(reg) = right.as_register() {
                        match left.as_number() {
                            Some(v) => (reg, v),
                            None => return Err(unencodable(expression)),
                        }
                    } else {
                        return Err(unencodable(expression));
                    };
                    if *op == BinaryOp::Sub {
                        value = -value;
                    }
                    (reg, value)
                }
                _ => return Err(unencodable(expression)),
            };

            if matches!(reg, Reg::Pc | Reg::Ex | Reg::Push | Reg::Pop) {
                return Err(BuildError::new(
                    AsmErrorKind::OperandPosition,
                    "Cannot reference PC or EX inside an indirect operand",
                    Some(reg.name()),
                    expression,
                ));
            }

            if value != 0 || expression.force_long {
                Ok(FieldEnc {
                    field: if reg == Reg::Sp {
                        0x1a
                    } else {
                        0x10 + reg.field_code()
                    },
                    immediate: Some(mask_word(value)),
                })
            } else {
                Ok(FieldEnc {
                    field: if reg == Reg::Sp {
                        0x19
                    } else {
                        0x08 + reg.field_code()
                    },
                    immediate: None,
                })
            }
        }
        _ => Err(unencodable(expression)),
    }
}

fn unencodable(expression: &Node) -> BuildError {
    BuildError::new(
        AsmErrorKind::Assembler,
        "Unencodable operand",
        Some(&crate::assembler::render::source(expression)),
        expression,
    )
}
