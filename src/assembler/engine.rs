// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Pipeline driver.
//!
//! Runs the stages in their fixed order (balance, expand, fold, mark,
//! verify, legalize), then iterates the relaxation loop: estimate label
//! ranges, substitute labels that collapsed to a point, re-fold, and encode
//! every instruction whose operands are fully literal, until nothing is
//! left to resolve. Staleness (an iteration that narrows no range) forces
//! ambiguous operand sizes to their long form, which guarantees progress at
//! the price of code density; that recovery is surfaced as a warning.

use std::collections::HashMap;

use crate::assembler::balance::balance_program;
use crate::assembler::encode::assemble_ready;
use crate::assembler::error::{AsmError, AsmErrorKind, BuildError, Diagnostic, Severity};
use crate::assembler::estimate::{estimate, Estimates};
use crate::assembler::expand::Expander;
use crate::assembler::fold::{flatten_program, mark_program};
use crate::assembler::lower::lower;
use crate::assembler::verify::verify;
use crate::core::ast::{count_operations, substitute_all, Node, NodeKind};

/// Build configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Reject instructions that would need legalization instead of
    /// rewriting them.
    pub forbid_complex: bool,
}

/// One compilation's pipeline state: options plus collected diagnostics.
pub struct Engine {
    options: BuildOptions,
    diagnostics: Vec<Diagnostic>,
}

impl Engine {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            options,
            diagnostics: Vec::new(),
        }
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Run the full pipeline, returning the finished tree of data blocks.
    pub fn build(&mut self, mut nodes: Vec<Node>) -> Result<Vec<Node>, BuildError> {
        balance_program(&mut nodes);
        let mut nodes = Expander::new().expand(nodes)?;
        flatten_program(&mut nodes)?;
        mark_program(&mut nodes);
        verify(&nodes)?;
        let mut nodes = lower(nodes, self.options.forbid_complex)?;

        let mut previous: Option<Estimates> = None;
        let mut force = false;
        loop {
            let estimates = estimate(&mut nodes, previous.as_ref(), force)?;

            // An iteration that changed nothing will never converge on its
            // own; the next one pins every ambiguous size to long.
            let stale = previous
                .as_ref()
                .is_some_and(|prev| !estimates.is_empty() && *prev == estimates);
            force = stale;
            if stale {
                self.diagnostics.push(Diagnostic::new(
                    0,
                    Severity::Warning,
                    AsmError::new(
                        AsmErrorKind::Assembler,
                        "Estimations went stale, forcing long constants",
                        None,
                    ),
                ));
            }

            let resolved: HashMap<String, Node> = estimates
                .iter()
                .filter(|(_, est)| est.resolved())
                .map(|(name, est)| {
                    (
                        name.clone(),
                        Node::new(NodeKind::Number(est.minimum as i64), 0, 0),
                    )
                })
                .collect();
            substitute_all(&mut nodes, &resolved);
            flatten_program(&mut nodes)?;
            assemble_ready(&mut nodes)?;

            previous = Some(estimates);
            if count_operations(&nodes) == 0 && !pending_layout(&nodes) {
                break;
            }
        }

        Ok(nodes)
    }
}

/// Layout directives that still need a relaxation iteration to lower.
fn pending_layout(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .any(|node| matches!(node.kind, NodeKind::Align(_) | NodeKind::Bss(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::output;
    use crate::core::parser::parse_program;

    fn build_words(source: &str) -> Result<Vec<u16>, BuildError> {
        let nodes = parse_program(source).expect("parse");
        let mut engine = Engine::new(BuildOptions::default());
        let tree = engine.build(nodes)?;
        output::words(&tree)
    }

    fn build_with_diagnostics(source: &str) -> (Vec<u16>, Vec<Diagnostic>) {
        let nodes = parse_program(source).expect("parse");
        let mut engine = Engine::new(BuildOptions::default());
        let tree = engine.build(nodes).expect("build");
        let words = output::words(&tree).expect("words");
        (words, engine.take_diagnostics())
    }

    #[test]
    fn end_to_end_three_instructions() {
        // :start SET A, 5 / ADD A, 1 / SET [start], A: three instruction
        // words, compact 5 and 1, and start as indirect-literal with a
        // trailing immediate of 0.
        let words = build_words(":start SET A, 5\nADD A, 1\nSET [start], A").expect("build");
        assert_eq!(
            words,
            vec![
                0x9801,                         // SET A, 5
                0x8802,                         // ADD A, 1
                (0x00 << 10) | (0x1E << 5) | 1, // SET [imm], A
                0x0000,                         // immediate: start == 0
            ]
        );
    }

    #[test]
    fn undefined_symbol_aborts_before_encoding() {
        let nodes = parse_program("SET A, nowhere").expect("parse");
        let mut engine = Engine::new(BuildOptions::default());
        let err = engine.build(nodes).expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::UnresolvedSymbol);
    }

    #[test]
    fn forward_references_relax_to_fixed_addresses() {
        // `end` sits past a long literal; the estimator needs an iteration
        // to learn the operand sizes.
        let words = build_words("SET A, end\nSET B, 0x1234\n:end DAT 7").expect("build");
        // end == 3 is compact, so the first instruction needs no immediate.
        assert_eq!(words, vec![(0x24 << 10) | 0x01, 0x7C21, 0x1234, 7]);
    }

    #[test]
    fn label_addresses_feed_data_blocks() {
        let words = build_words(":a DAT 1\n:b DAT b").expect("build");
        assert_eq!(words, vec![1, 1]);
    }

    #[test]
    fn org_relocates_labels_without_emitting_words() {
        let words = build_words(".org 0x100\n:here DAT here").expect("build");
        assert_eq!(words, vec![0x100]);
    }

    #[test]
    fn align_pads_with_zeros() {
        let words = build_words("DAT 1\n.align 4\n:tab DAT tab").expect("build");
        assert_eq!(words, vec![1, 0, 0, 0, 4]);
    }

    #[test]
    fn bss_reserves_zeroed_words() {
        let words = build_words("DAT 9\n.bss 2\nDAT 9").expect("build");
        assert_eq!(words, vec![9, 0, 0, 9]);
    }

    #[test]
    fn legalized_instructions_survive_the_whole_pipeline() {
        let words = build_words(":v DAT 3\nADD A, [v] * 2").expect("build");
        // The exact sequence is covered by the lowering tests; here the
        // point is that everything resolves and encodes.
        assert!(words.len() > 3);
        assert_eq!(words[0], 3);
    }

    #[test]
    fn self_dependent_label_terminates_via_forcing() {
        // `b` lands on 30 if the reference is compact and 31 if it is
        // long: two fixed points, so the range never narrows on its own.
        // The staleness force must pick the long form, warn, and leave an
        // image whose baked-in address matches the emitted layout.
        let padding = ["0"; 29].join(", ");
        let source = format!("SET A, b\nDAT {padding}\n:b DAT b");
        let (words, diagnostics) = build_with_diagnostics(&source);
        assert!(diagnostics
            .iter()
            .any(|d| d.severity() == Severity::Warning
                && d.message().contains("forcing long constants")));
        // Long form: opcode word + immediate + 29 padding words puts b at 31.
        assert_eq!(words.len(), 32);
        assert_eq!(words[0], (0x1F << 10) | 0x01);
        assert_eq!(words[1], 31);
        assert_eq!(*words.last().expect("data word"), 31);
    }

    #[test]
    fn relaxed_sizes_match_emitted_sizes() {
        let source = ".org 0x10\n:first SET B, second\n:second DAT second";
        let (words, diagnostics) = build_with_diagnostics(source);
        assert!(diagnostics.is_empty(), "no forcing needed");
        // second == 0x10 + size(SET B, second); the DAT word must agree.
        let dat = *words.last().expect("data word");
        assert_eq!(dat as usize, 0x10 + words.len() - 1);
    }

    #[test]
    fn forbid_complex_option_propagates() {
        let nodes = parse_program(":v DAT 0\nSET A, [v] + 1").expect("parse");
        let mut engine = Engine::new(BuildOptions {
            forbid_complex: true,
        });
        let err = engine.build(nodes).expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::Expression);
    }

    #[test]
    fn macros_and_equates_assemble_end_to_end() {
        let source = "\
.equ ONE, 1\n\
.macro bump(reg)\n\
ADD reg, ONE\n\
.endmacro\n\
bump A\n\
bump B";
        let words = build_words(source).expect("build");
        assert_eq!(words, vec![0x8802, (0x22 << 10) | (0x01 << 5) | 0x02]);
    }
}
