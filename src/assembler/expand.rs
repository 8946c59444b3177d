// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Definition expansion stage.
//!
//! Walks the top-level sequence left to right, maintaining equate and macro
//! tables scoped to the current `proc` or the top level. Definitions are
//! removed from the output stream; macro calls are replaced by their
//! hygienically relabeled expansion.
//!
//! Hygiene: names beginning with `_` are local to one macro expansion or
//! one `proc` instance. Each expansion draws a fresh `$N` suffix from the
//! expander-owned counter, so two expansions of the same macro can never
//! collide on a local label.

use std::collections::HashMap;

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::core::ast::{relabel, substitute, substitute_all, Node, NodeKind};

struct MacroEntry {
    params: Vec<String>,
    contents: Vec<Node>,
}

/// Expands macros, equates, and `proc` scopes.
///
/// One expander services one compilation; the hygiene counter is explicit
/// state so parallel compilations each seed their own.
pub struct Expander {
    hygiene_counter: u64,
}

impl Default for Expander {
    fn default() -> Self {
        Self::new()
    }
}

impl Expander {
    pub fn new() -> Self {
        Self { hygiene_counter: 0 }
    }

    pub fn expand(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, BuildError> {
        self.expand_scope(nodes)
    }

    fn fresh_suffix(&mut self) -> String {
        let suffix = format!("${}", self.hygiene_counter);
        self.hygiene_counter += 1;
        suffix
    }

    fn expand_scope(&mut self, nodes: Vec<Node>) -> Result<Vec<Node>, BuildError> {
        let mut equates: HashMap<String, Node> = HashMap::new();
        let mut macros: HashMap<String, MacroEntry> = HashMap::new();
        let mut out = Vec::new();

        for element in nodes {
            let (line, column) = (element.line, element.column);
            match element.kind {
                NodeKind::Equate { name, value } => {
                    if equates.contains_key(&name) {
                        return Err(BuildError::pos(
                            AsmErrorKind::Redefinition,
                            "Cannot redefine",
                            Some(&name),
                            line,
                            column,
                        ));
                    }
                    // Resolve earlier equates into the stored value so
                    // chained definitions substitute in one pass.
                    let mut value = *value;
                    substitute(&mut value, &equates);
                    equates.insert(name, value);
                }
                NodeKind::MacroDef {
                    name,
                    params,
                    contents,
                } => {
                    if equates.contains_key(&name) {
                        return Err(BuildError::pos(
                            AsmErrorKind::Redefinition,
                            "Cannot redefine",
                            Some(&name),
                            line,
                            column,
                        ));
                    }
                    // Nested definitions inside the body expand now, in
                    // their own scope. Macro-over-macro silently overwrites.
                    let contents = self.expand_scope(contents)?;
                    macros.insert(name, MacroEntry { params, contents });
                }
                NodeKind::Proc(contents) => {
                    let mut contents = contents;
                    let suffix = self.fresh_suffix();
                    relabel(&mut contents, &suffix);
                    let expanded = self.expand_scope(contents)?;
                    out.extend(expanded);
                }
                NodeKind::Operation { name, args } => match macros.get(&name) {
                    Some(mac) => {
                        if mac.params.len() != args.len() {
                            return Err(BuildError::pos(
                                AsmErrorKind::Arity,
                                &format!(
                                    "Macro {} argument mismatch: expected {}, got {}",
                                    name,
                                    mac.params.len(),
                                    args.len()
                                ),
                                None,
                                line,
                                column,
                            ));
                        }
                        let suffix = self.fresh_suffix();
                        let mut body = mac.contents.clone();
                        relabel(&mut body, &suffix);
                        // Parameters bind the call-site arguments verbatim;
                        // a `_`-prefixed parameter was renamed inside the
                        // body just now, so its key follows suit.
                        let bindings: HashMap<String, Node> = mac
                            .params
                            .iter()
                            .zip(args)
                            .map(|(param, arg)| {
                                let key = if param.starts_with('_') {
                                    format!("{param}{suffix}")
                                } else {
                                    param.clone()
                                };
                                (key, arg)
                            })
                            .collect();
                        substitute_all(&mut body, &bindings);
                        substitute_all(&mut body, &equates);
                        out.extend(body);
                    }
                    None => {
                        let mut node = Node::new(NodeKind::Operation { name, args }, line, column);
                        substitute(&mut node, &equates);
                        out.push(node);
                    }
                },
                kind => {
                    let mut node = Node::new(kind, line, column);
                    substitute(&mut node, &equates);
                    out.push(node);
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ast::collect_identifiers;
    use crate::core::parser::parse_program;

    fn expand_source(source: &str) -> Result<Vec<Node>, BuildError> {
        let nodes = parse_program(source).expect("parse");
        Expander::new().expand(nodes)
    }

    fn labels(nodes: &[Node]) -> Vec<String> {
        nodes
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Label(name) => Some(name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn equates_substitute_and_disappear() {
        let nodes = expand_source(".equ SIZE, 16\nSET A, SIZE").expect("expand");
        assert_eq!(nodes.len(), 1);
        match &nodes[0].kind {
            NodeKind::Operation { args, .. } => assert_eq!(args[1].as_number(), Some(16)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn chained_equates_resolve() {
        let nodes = expand_source(".equ BASE, 0x100\n.equ TOP, BASE\nSET A, TOP").expect("expand");
        match &nodes[0].kind {
            NodeKind::Operation { args, .. } => assert_eq!(args[1].as_number(), Some(0x100)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn equate_redefinition_is_fatal_and_keeps_original() {
        let err = expand_source(".equ X, 1\n.equ X, 2").expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::Redefinition);
        assert_eq!(err.line(), 2);
    }

    #[test]
    fn macro_after_equate_of_same_name_is_fatal() {
        let err =
            expand_source(".equ X, 1\n.macro X\nSET A, 1\n.endmacro").expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::Redefinition);
    }

    #[test]
    fn macro_redefinition_silently_overwrites() {
        let nodes = expand_source(
            ".macro put\nSET A, 1\n.endmacro\n.macro put\nSET A, 2\n.endmacro\nput",
        )
        .expect("expand");
        assert_eq!(nodes.len(), 1);
        match &nodes[0].kind {
            NodeKind::Operation { args, .. } => assert_eq!(args[1].as_number(), Some(2)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn macro_expansion_binds_parameters() {
        let nodes =
            expand_source(".macro load(dst, src)\nSET dst, [src]\n.endmacro\nload A, 0x1000")
                .expect("expand");
        assert_eq!(nodes.len(), 1);
        match &nodes[0].kind {
            NodeKind::Operation { name, args } => {
                assert_eq!(name, "SET");
                assert!(args[0].is_register());
                assert!(matches!(args[1].kind, NodeKind::Indirect(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn macro_arity_mismatch_is_fatal() {
        let err = expand_source(".macro pair(a2, b2)\nDAT a2, b2\n.endmacro\npair 1")
            .expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::Arity);
    }

    #[test]
    fn macro_locals_get_distinct_suffixes_per_expansion() {
        let nodes = expand_source(
            ".macro spin\n:_loop\nSUB A, 1\nIFN A, 0\nSET PC, _loop\n.endmacro\nspin\nspin",
        )
        .expect("expand");
        let defined = labels(&nodes);
        assert_eq!(defined.len(), 2);
        assert_ne!(defined[0], defined[1]);
        assert!(defined[0].starts_with("_loop$"));
        // Each expansion's reference resolves to its own label.
        let mut referenced = Vec::new();
        for node in &nodes {
            collect_identifiers(node, &mut referenced);
        }
        for name in &referenced {
            assert!(defined.contains(name), "{name} must be defined");
        }
    }

    #[test]
    fn proc_contents_are_spliced_with_fresh_locals() {
        let nodes = expand_source(
            ".proc\n:_tmp\nDAT 0\n.endproc\n.proc\n:_tmp\nDAT 0\n.endproc",
        )
        .expect("expand");
        let defined = labels(&nodes);
        assert_eq!(defined.len(), 2);
        assert_ne!(defined[0], defined[1]);
        assert!(!nodes.iter().any(|n| matches!(n.kind, NodeKind::Proc(_))));
    }

    #[test]
    fn proc_equates_do_not_leak() {
        // The proc-scoped equate dies with its scope; the later use stays
        // an identifier for the verifier to flag.
        let nodes =
            expand_source(".proc\n.equ INNER, 5\nDAT INNER\n.endproc\nDAT INNER").expect("expand");
        assert_eq!(nodes.len(), 2);
        match &nodes[0].kind {
            NodeKind::Data(args) => assert_eq!(args[0].as_number(), Some(5)),
            other => panic!("unexpected: {other:?}"),
        }
        match &nodes[1].kind {
            NodeKind::Data(args) => {
                assert!(matches!(&args[0].kind, NodeKind::Identifier(n) if n == "INNER"))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn outer_equates_reach_macro_bodies_at_call_time() {
        let nodes = expand_source(
            ".macro emit\nDAT WIDTH\n.endmacro\n.equ WIDTH, 32\nemit",
        )
        .expect("expand");
        match &nodes[0].kind {
            NodeKind::Data(args) => assert_eq!(args[0].as_number(), Some(32)),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn call_site_arguments_bind_unsubstituted_then_resolve() {
        // The argument expression is bound verbatim; outer equates land in
        // the second substitution pass.
        let nodes = expand_source(
            ".macro emit(v)\nDAT v\n.endmacro\n.equ K, 7\nemit K",
        )
        .expect("expand");
        match &nodes[0].kind {
            NodeKind::Data(args) => assert_eq!(args[0].as_number(), Some(7)),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
