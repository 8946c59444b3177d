// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Addressing-mode legalization stage.
//!
//! The machine only encodes a handful of operand forms (registers, compact
//! or immediate literals, `[reg]`, `[reg +/- literal]`, `[literal]`). Any
//! instruction using a richer expression is rewritten into an equivalent
//! sequence that computes the value through stack temporaries, borrowing an
//! unused register when an address has to be dereferenced.

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::assembler::render;
use crate::core::ast::{visit, BinaryOp, Node, NodeKind, UnaryOp};
use crate::core::isa::{instruction, Reg, GENERAL};

/// Is this operand directly encodable?
pub fn base(expr: &Node) -> bool {
    match &expr.kind {
        NodeKind::Register(_) => true,
        NodeKind::Indirect(value) => {
            if value.integer {
                return true;
            }
            if let Some(reg) = value.as_register() {
                return reg.is_indexable();
            }
            if let NodeKind::Binary { op, left, right } = &value.kind {
                // `reg + literal` either way around; `reg - literal` only
                // with the register on the left.
                match op {
                    BinaryOp::Add | BinaryOp::Sub => {
                        if right.integer && left.as_register().is_some_and(Reg::is_indexable) {
                            return true;
                        }
                        if *op == BinaryOp::Add
                            && left.integer
                            && right.as_register().is_some_and(Reg::is_indexable)
                        {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
            false
        }
        _ => expr.integer,
    }
}

fn uses_stack(node: &Node) -> bool {
    let mut found = false;
    visit(node, &mut |e| {
        if e.as_register().is_some_and(Reg::touches_stack) {
            found = true;
        }
    });
    found
}

/// Detect indirection below `node`; unless `skip_validation`, also reject
/// the registers that cannot appear inside a computed expression.
fn indexed(node: &Node, skip_validation: bool) -> Result<bool, BuildError> {
    let mut found_indirect = false;
    let mut bad: Option<(u32, usize)> = None;
    visit(node, &mut |e| match &e.kind {
        NodeKind::Register(reg) => {
            if !skip_validation
                && bad.is_none()
                && matches!(reg, Reg::Ex | Reg::Pc | Reg::Sp | Reg::Push | Reg::Pop)
            {
                bad = Some((e.line, e.column));
            }
        }
        NodeKind::Indirect(_) => found_indirect = true,
        _ => {}
    });
    if let Some((line, column)) = bad {
        return Err(BuildError::pos(
            AsmErrorKind::OperandPosition,
            "Cannot use EX, PC or Stack in complex expressions",
            None,
            line,
            column,
        ));
    }
    Ok(found_indirect)
}

/// Registers the instruction does not touch, available for borrowing.
fn safe_registers(args: &[Node]) -> Vec<Reg> {
    let mut used = Vec::new();
    for arg in args {
        visit(arg, &mut |e| {
            if let Some(reg) = e.as_register() {
                used.push(reg);
            }
        });
    }
    GENERAL
        .iter()
        .copied()
        .filter(|reg| !used.contains(reg))
        .collect()
}

fn binary_mnemonic(op: BinaryOp) -> Option<&'static str> {
    let mnemonic = match op {
        BinaryOp::Add => "ADD",
        BinaryOp::Sub => "SUB",
        BinaryOp::Mul => "MLI",
        BinaryOp::Div => "DVI",
        BinaryOp::Mod => "MDI",
        BinaryOp::Shl => "SHL",
        BinaryOp::Shr => "ASR",
        BinaryOp::UShr => "SHR",
        BinaryOp::BitXor => "XOR",
        BinaryOp::BitOr => "BOR",
        BinaryOp::BitAnd => "AND",
        BinaryOp::LogicAnd | BinaryOp::LogicOr | BinaryOp::Pack => return None,
    };
    Some(mnemonic)
}

/// Legalize every instruction in the stream.
///
/// With `forbid_complex` set, a non-base operand is a fatal error instead;
/// the offending instruction is rendered back to source in the message.
pub fn lower(nodes: Vec<Node>, forbid_complex: bool) -> Result<Vec<Node>, BuildError> {
    let mut out = Vec::new();
    for element in nodes {
        if !matches!(element.kind, NodeKind::Operation { .. }) {
            out.push(element);
            continue;
        }
        let all_base = match &element.kind {
            NodeKind::Operation { args, .. } => args.iter().all(base),
            _ => true,
        };
        if all_base {
            out.push(element);
            continue;
        }
        if forbid_complex {
            return Err(BuildError::new(
                AsmErrorKind::Expression,
                "Complex expression in",
                Some(&render::source(&element)),
                &element,
            ));
        }
        out.extend(lower_instruction(element)?);
    }
    Ok(out)
}

struct Rewriter {
    line: u32,
    column: usize,
    output: Vec<Node>,
    depth: usize,
}

impl Rewriter {
    fn node(&self, kind: NodeKind) -> Node {
        Node::new(kind, self.line, self.column)
    }

    fn reg(&self, reg: Reg) -> Node {
        self.node(NodeKind::Register(reg))
    }

    fn number(&self, value: i64) -> Node {
        self.node(NodeKind::Number(value))
    }

    fn indirect(&self, inner: Node) -> Node {
        self.node(NodeKind::Indirect(Box::new(inner)))
    }

    fn op(&mut self, name: &str, args: Vec<Node>) {
        let node = self.node(NodeKind::Operation {
            name: name.to_string(),
            args,
        });
        self.output.push(node);
    }

    /// Reduce an expression to a value on top of the hardware stack.
    fn reduce(&mut self, tree: Node, indexer: Option<Reg>) -> Result<(), BuildError> {
        if base(&tree) {
            let push = self.reg(Reg::Push);
            self.op("SET", vec![push, tree]);
            return Ok(());
        }
        match tree.kind {
            NodeKind::Indirect(value) => {
                let idx = match indexer {
                    Some(idx) => idx,
                    None => {
                        return Err(BuildError::pos(
                            AsmErrorKind::ResourceExhaustion,
                            "Not enough registers for indexers",
                            None,
                            self.line,
                            self.column,
                        ))
                    }
                };
                self.reduce(*value, indexer)?;
                let (dst, src) = (self.reg(idx), self.reg(Reg::Pop));
                self.op("SET", vec![dst, src]);
                let (push, deref) = (self.reg(Reg::Push), self.indirect(self.reg(idx)));
                self.op("SET", vec![push, deref]);
            }
            NodeKind::Unary { op, value } => {
                let mnemonic = match op {
                    UnaryOp::Neg => "MLI",
                    UnaryOp::Not => "XOR",
                    UnaryOp::AddrOf => {
                        return Err(BuildError::pos(
                            AsmErrorKind::Expression,
                            "Cannot handle unary operator",
                            Some(op.symbol()),
                            self.line,
                            self.column,
                        ))
                    }
                };
                self.reduce(*value, indexer)?;
                let (top, minus_one) = (self.indirect(self.reg(Reg::Sp)), self.number(-1));
                self.op(mnemonic, vec![top, minus_one]);
            }
            NodeKind::Paren(inner) => self.reduce(*inner, indexer)?,
            NodeKind::Binary { op, left, right } => {
                let mnemonic = match binary_mnemonic(op) {
                    Some(m) => m,
                    None => {
                        return Err(BuildError::pos(
                            AsmErrorKind::Expression,
                            "Cannot run-time execute operation",
                            Some(op.symbol()),
                            self.line,
                            self.column,
                        ))
                    }
                };
                self.reduce(*left, indexer)?;
                let temp = if base(&right) {
                    *right
                } else {
                    self.reduce(*right, indexer)?;
                    self.reg(Reg::Pop)
                };
                let top = self.indirect(self.reg(Reg::Sp));
                self.op(mnemonic, vec![top, temp]);
            }
            _ => {
                return Err(BuildError::pos(
                    AsmErrorKind::Expression,
                    "Cannot reduce expression term",
                    None,
                    self.line,
                    self.column,
                ))
            }
        }
        Ok(())
    }
}

fn lower_instruction(element: Node) -> Result<Vec<Node>, BuildError> {
    let (line, column) = (element.line, element.column);
    let (name, args) = match element.kind {
        NodeKind::Operation { name, args } => (name, args),
        _ => return Ok(vec![element]),
    };

    // Stack mutation and a borrowed index register cannot be sequenced
    // safely in one instruction.
    let mut stack_based = false;
    let mut indexed_complex = false;
    for arg in &args {
        stack_based = stack_based || uses_stack(arg);
        indexed_complex = indexed_complex || (indexed(arg, true)? && !base(arg));
    }
    if stack_based && indexed_complex {
        return Err(BuildError::pos(
            AsmErrorKind::OperandCombination,
            "Cannot combine Stack with Indexed complex expressions",
            None,
            line,
            column,
        ));
    }

    let desc = match instruction(&name) {
        Some(desc) => desc,
        None => {
            return Err(BuildError::pos(
                AsmErrorKind::UnknownOpcode,
                "Unrecognized opcode",
                Some(&name),
                line,
                column,
            ))
        }
    };
    let preserve_ex = desc.volatile_ex || !desc.carry_safe;

    let mut indexers = safe_registers(&args);
    let mut preserve_regs: Vec<Reg> = Vec::new();

    let mut rewriter = Rewriter {
        line,
        column,
        output: Vec::new(),
        depth: 0,
    };

    if preserve_ex {
        let (push, ex) = (rewriter.reg(Reg::Push), rewriter.reg(Reg::Ex));
        rewriter.op("SET", vec![push, ex]);
    }

    let arg_count = args.len();
    let mut new_args = Vec::with_capacity(arg_count);
    for (index, exp) in args.into_iter().enumerate() {
        let last = index == arg_count - 1;

        if !last && !matches!(exp.kind, NodeKind::Register(_) | NodeKind::Indirect(_)) {
            return Err(BuildError::new(
                AsmErrorKind::OperandPosition,
                "Left-hand argument must be an address or register",
                None,
                &exp,
            ));
        }

        if base(&exp) {
            new_args.push(exp);
            continue;
        }

        let needs_indexer = indexed(&exp, false)?;
        let indexer = if needs_indexer {
            match indexers.pop() {
                Some(reg) => {
                    preserve_regs.push(reg);
                    Some(reg)
                }
                None => {
                    return Err(BuildError::new(
                        AsmErrorKind::ResourceExhaustion,
                        "Not enough registers for indexers",
                        None,
                        &exp,
                    ))
                }
            }
        } else {
            None
        };

        rewriter.depth += 1;
        if last {
            rewriter.reduce(exp, indexer)?;
            new_args.push(rewriter.reg(Reg::Pop));
        } else {
            // A non-base destination is an indirect store: compute the
            // address, land it in the borrowed register, and address
            // through it.
            let idx = match indexer {
                Some(idx) => idx,
                None => {
                    return Err(BuildError::new(
                        AsmErrorKind::ResourceExhaustion,
                        "Not enough registers for indexers",
                        None,
                        &exp,
                    ))
                }
            };
            let inner = match exp.kind {
                NodeKind::Indirect(inner) => *inner,
                _ => exp,
            };
            rewriter.reduce(inner, indexer)?;
            let (dst, src) = (rewriter.reg(idx), rewriter.reg(Reg::Pop));
            rewriter.op("SET", vec![dst, src]);
            rewriter.depth -= 1;
            let deref = rewriter.indirect(rewriter.reg(idx));
            new_args.push(deref);
        }
    }

    let rewritten = Node::new(NodeKind::Operation {
        name,
        args: new_args,
    }, line, column);

    let depth = rewriter.depth;
    if preserve_ex {
        if depth > 0 {
            // The saved EX sits below the remaining temporaries; read it in
            // place, run the instruction, then drop the slot.
            let sp_plus = rewriter.indirect(rewriter.node(NodeKind::Binary {
                op: BinaryOp::Add,
                left: Box::new(rewriter.reg(Reg::Sp)),
                right: Box::new(rewriter.number(depth as i64)),
            }));
            let ex = rewriter.reg(Reg::Ex);
            rewriter.op("SET", vec![ex, sp_plus]);
            rewriter.output.push(rewritten);
            let (sp, amount) = (rewriter.reg(Reg::Sp), rewriter.number(depth as i64));
            rewriter.op("ADD", vec![sp, amount]);
        } else {
            let (ex, pop) = (rewriter.reg(Reg::Ex), rewriter.reg(Reg::Pop));
            rewriter.op("SET", vec![ex, pop]);
            rewriter.output.push(rewritten);
        }
    } else {
        rewriter.output.push(rewritten);
    }

    let mut output = rewriter.output;
    for reg in preserve_regs {
        let save = Node::new(
            NodeKind::Operation {
                name: "SET".to_string(),
                args: vec![
                    Node::new(NodeKind::Register(Reg::Push), line, column),
                    Node::new(NodeKind::Register(reg), line, column),
                ],
            },
            line,
            column,
        );
        let restore = Node::new(
            NodeKind::Operation {
                name: "SET".to_string(),
                args: vec![
                    Node::new(NodeKind::Register(reg), line, column),
                    Node::new(NodeKind::Register(Reg::Pop), line, column),
                ],
            },
            line,
            column,
        );
        output.insert(0, save);
        output.push(restore);
    }

    Ok(output)
}
