// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Recursive-descent parser producing the pipeline's AST.
//!
//! The parser attaches `line`/`column` to every node and makes no attempt
//! to resolve operator precedence: runs of binary operators at one
//! parenthesis level become `Unordered` chains carrying each operator's
//! priority/reorder/inverse metadata, and the reassociation stage decides
//! the grouping.

use std::fmt;

use crate::core::ast::{BinaryOp, ChainLink, IncludeFormat, Node, NodeKind, Reorder, UnaryOp};
use crate::core::isa::Reg;
use crate::core::tokenizer::{tokenize, Token, TokenKind};

/// Syntax error with source position.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub message: String,
    pub line: u32,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, line: u32, column: usize) -> Self {
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Chain metadata for a binary operator.
///
/// Higher priority binds tighter. `Full` reorder marks commutative
/// operators; subtraction is `Partial` with `+` as its inverse so folds
/// that move it past a neighbor stay algebraically valid.
pub fn chain_link(op: BinaryOp) -> ChainLink {
    let (priority, reorder, inverse) = match op {
        BinaryOp::Pack => (1, Reorder::None, None),
        BinaryOp::LogicOr => (2, Reorder::None, None),
        BinaryOp::LogicAnd => (3, Reorder::None, None),
        BinaryOp::BitOr => (4, Reorder::Full, None),
        BinaryOp::BitXor => (5, Reorder::Full, None),
        BinaryOp::BitAnd => (6, Reorder::Full, None),
        BinaryOp::Shl | BinaryOp::Shr | BinaryOp::UShr => (7, Reorder::None, None),
        BinaryOp::Add => (8, Reorder::Full, None),
        BinaryOp::Sub => (8, Reorder::Partial, Some(BinaryOp::Add)),
        BinaryOp::Mul => (9, Reorder::Full, None),
        BinaryOp::Div | BinaryOp::Mod => (9, Reorder::None, None),
    };
    ChainLink {
        op,
        priority,
        reorder,
        inverse,
    }
}

/// Parse a full source text into a top-level node sequence.
pub fn parse_program(source: &str) -> Result<Vec<Node>, ParseError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser { tokens, pos: 0 };
    parser.block(None)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek2(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1)
    }

    fn bump(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        self.pos += 1;
        token
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::new(message, token.line, token.column),
            None => {
                let (line, column) = self
                    .tokens
                    .last()
                    .map(|t| (t.line, t.column))
                    .unwrap_or((1, 1));
                ParseError::new(message, line, column)
            }
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Newline)) {
            self.bump();
        }
    }

    fn expect_newline(&mut self) -> Result<(), ParseError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Newline) => {
                self.bump();
                Ok(())
            }
            None => Ok(()),
            Some(_) => Err(self.error_here("Expected end of line")),
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<(String, u32, usize), ParseError> {
        match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                line,
                column,
            }) => {
                self.pos += 1;
                Ok((name, line, column))
            }
            _ => Err(self.error_here(format!("Expected {what}"))),
        }
    }

    /// Parse statements until `terminator` (a directive name) or, with no
    /// terminator, the end of input.
    fn block(&mut self, terminator: Option<&str>) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        loop {
            self.skip_newlines();
            match self.peek() {
                None => {
                    if let Some(term) = terminator {
                        return Err(self.error_here(format!("Missing .{term}")));
                    }
                    return Ok(nodes);
                }
                Some(token) => {
                    if let TokenKind::Directive(name) = &token.kind {
                        if Some(name.as_str()) == terminator {
                            self.bump();
                            return Ok(nodes);
                        }
                    }
                }
            }
            self.statement(&mut nodes)?;
        }
    }

    /// One source line: any number of labels, then at most one directive,
    /// data block, or instruction.
    fn statement(&mut self, out: &mut Vec<Node>) -> Result<(), ParseError> {
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Newline) | None => {
                    self.expect_newline()?;
                    return Ok(());
                }
                Some(TokenKind::Colon) => {
                    let colon = self.bump();
                    let (name, _, _) = self.expect_identifier("label name")?;
                    out.push(Node::new(NodeKind::Label(name), colon.line, colon.column));
                }
                Some(TokenKind::Identifier(_))
                    if matches!(self.peek2().map(|t| &t.kind), Some(TokenKind::Colon)) =>
                {
                    let (name, line, column) = self.expect_identifier("label name")?;
                    self.bump();
                    out.push(Node::new(NodeKind::Label(name), line, column));
                }
                Some(TokenKind::Directive(_)) => {
                    self.directive(out)?;
                    self.expect_newline()?;
                    return Ok(());
                }
                Some(TokenKind::Identifier(name)) if name.eq_ignore_ascii_case("dat") => {
                    let token = self.bump();
                    let args = self.argument_list()?;
                    out.push(Node::new(NodeKind::Data(args), token.line, token.column));
                    self.expect_newline()?;
                    return Ok(());
                }
                Some(TokenKind::Identifier(_)) => {
                    let (name, line, column) = self.expect_identifier("mnemonic")?;
                    let args = self.argument_list()?;
                    out.push(Node::new(NodeKind::Operation { name, args }, line, column));
                    self.expect_newline()?;
                    return Ok(());
                }
                Some(_) => return Err(self.error_here("Expected statement")),
            }
        }
    }

    fn directive(&mut self, out: &mut Vec<Node>) -> Result<(), ParseError> {
        let (name, line, column) = match self.peek().cloned() {
            Some(Token {
                kind: TokenKind::Directive(name),
                line,
                column,
            }) => {
                self.pos += 1;
                (name, line, column)
            }
            _ => return Err(self.error_here("Expected directive")),
        };

        match name.as_str() {
            "org" | "align" | "bss" => {
                let value = Box::new(self.expr()?);
                let kind = match name.as_str() {
                    "org" => NodeKind::Org(value),
                    "align" => NodeKind::Align(value),
                    _ => NodeKind::Bss(value),
                };
                out.push(Node::new(kind, line, column));
            }
            "equ" | "equate" => {
                let (equ_name, _, _) = self.expect_identifier("equate name")?;
                if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                    self.bump();
                }
                let value = Box::new(self.expr()?);
                out.push(Node::new(
                    NodeKind::Equate {
                        name: equ_name,
                        value,
                    },
                    line,
                    column,
                ));
            }
            "dat" | "data" => {
                let args = self.argument_list()?;
                out.push(Node::new(NodeKind::Data(args), line, column));
            }
            "macro" => {
                let (macro_name, _, _) = self.expect_identifier("macro name")?;
                let params = self.macro_params()?;
                self.expect_newline()?;
                let contents = self.block(Some("endmacro"))?;
                out.push(Node::new(
                    NodeKind::MacroDef {
                        name: macro_name,
                        params,
                        contents,
                    },
                    line,
                    column,
                ));
            }
            "proc" => {
                self.expect_newline()?;
                let contents = self.block(Some("endproc"))?;
                out.push(Node::new(NodeKind::Proc(contents), line, column));
            }
            "include" => {
                let format = match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::Identifier(word))
                        if word.eq_ignore_ascii_case("bin")
                            || word.eq_ignore_ascii_case("binary") =>
                    {
                        self.bump();
                        IncludeFormat::Binary
                    }
                    _ => IncludeFormat::Source,
                };
                let path = match self.peek().cloned() {
                    Some(Token {
                        kind: TokenKind::Str(path),
                        ..
                    }) => {
                        self.pos += 1;
                        path
                    }
                    _ => return Err(self.error_here("Expected include path string")),
                };
                out.push(Node::new(NodeKind::Include { format, path }, line, column));
            }
            other => {
                return Err(ParseError::new(
                    format!("Unknown directive: .{other}"),
                    line,
                    column,
                ))
            }
        }
        Ok(())
    }

    fn macro_params(&mut self) -> Result<Vec<String>, ParseError> {
        let mut params = Vec::new();
        let parenthesized = matches!(self.peek().map(|t| &t.kind), Some(TokenKind::LParen));
        if parenthesized {
            self.bump();
        }
        loop {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::Identifier(_)) => {
                    let (name, _, _) = self.expect_identifier("parameter name")?;
                    params.push(name);
                    if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                        self.bump();
                        continue;
                    }
                    break;
                }
                _ => break,
            }
        }
        if parenthesized {
            match self.peek().map(|t| &t.kind) {
                Some(TokenKind::RParen) => {
                    self.bump();
                }
                _ => return Err(self.error_here("Expected ) after macro parameters")),
            }
        }
        Ok(params)
    }

    fn argument_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Newline)) || self.at_end() {
            return Ok(args);
        }
        loop {
            args.push(self.expr()?);
            if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
                self.bump();
                continue;
            }
            return Ok(args);
        }
    }

    fn expr(&mut self) -> Result<Node, ParseError> {
        let first = self.prefix()?;
        let mut rest = Vec::new();
        while let Some(op) = self.peek_binop() {
            self.bump();
            let value = self.prefix()?;
            rest.push((chain_link(op), value));
        }
        Ok(build_chain(first, rest.into_iter()))
    }

    fn peek_binop(&self) -> Option<BinaryOp> {
        let op = match self.peek().map(|t| &t.kind)? {
            TokenKind::Plus => BinaryOp::Add,
            TokenKind::Minus => BinaryOp::Sub,
            TokenKind::Star => BinaryOp::Mul,
            TokenKind::Slash => BinaryOp::Div,
            TokenKind::Percent => BinaryOp::Mod,
            TokenKind::Shl => BinaryOp::Shl,
            TokenKind::Shr => BinaryOp::Shr,
            TokenKind::UShr => BinaryOp::UShr,
            TokenKind::Amp => BinaryOp::BitAnd,
            TokenKind::Pipe => BinaryOp::BitOr,
            TokenKind::Caret => BinaryOp::BitXor,
            TokenKind::AmpAmp => BinaryOp::LogicAnd,
            TokenKind::PipePipe => BinaryOp::LogicOr,
            TokenKind::Hash => BinaryOp::Pack,
            _ => return None,
        };
        Some(op)
    }

    fn prefix(&mut self) -> Result<Node, ParseError> {
        let op = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Minus) => Some(UnaryOp::Neg),
            Some(TokenKind::Tilde) => Some(UnaryOp::Not),
            Some(TokenKind::Amp) => Some(UnaryOp::AddrOf),
            _ => None,
        };
        if let Some(op) = op {
            let token = self.bump();
            let value = Box::new(self.prefix()?);
            return Ok(Node::new(
                NodeKind::Unary { op, value },
                token.line,
                token.column,
            ));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node, ParseError> {
        let token = match self.peek().cloned() {
            Some(token) => token,
            None => return Err(self.error_here("Expected expression")),
        };
        match token.kind {
            TokenKind::Number(value) => {
                self.pos += 1;
                Ok(Node::new(NodeKind::Number(value), token.line, token.column))
            }
            TokenKind::Str(text) => {
                self.pos += 1;
                Ok(Node::new(NodeKind::Str(text), token.line, token.column))
            }
            TokenKind::Identifier(name) => {
                self.pos += 1;
                let kind = match Reg::from_name(&name) {
                    Some(reg) => NodeKind::Register(reg),
                    None => NodeKind::Identifier(name),
                };
                Ok(Node::new(kind, token.line, token.column))
            }
            TokenKind::LParen => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::RParen) => {
                        self.bump();
                    }
                    _ => return Err(self.error_here("Expected )")),
                }
                Ok(Node::new(
                    NodeKind::Paren(Box::new(inner)),
                    token.line,
                    token.column,
                ))
            }
            TokenKind::LBracket => {
                self.pos += 1;
                let inner = self.expr()?;
                match self.peek().map(|t| &t.kind) {
                    Some(TokenKind::RBracket) => {
                        self.bump();
                    }
                    _ => return Err(self.error_here("Expected ]")),
                }
                Ok(Node::new(
                    NodeKind::Indirect(Box::new(inner)),
                    token.line,
                    token.column,
                ))
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }
}

/// Thread values and operator links into a right-leaning `Unordered` chain.
fn build_chain(first: Node, mut rest: std::vec::IntoIter<(ChainLink, Node)>) -> Node {
    match rest.next() {
        None => first,
        Some((link, value)) => {
            let (line, column) = (first.line, first.column);
            let right = build_chain(value, rest);
            Node::new(
                NodeKind::Unordered {
                    link,
                    left: Box::new(first),
                    right: Box::new(right),
                },
                line,
                column,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> Node {
        let mut nodes = parse_program(source).expect("parse");
        assert_eq!(nodes.len(), 1, "{nodes:?}");
        nodes.remove(0)
    }

    #[test]
    fn instruction_with_register_and_literal() {
        let node = parse_one("SET A, 5");
        match node.kind {
            NodeKind::Operation { name, args } => {
                assert_eq!(name, "SET");
                assert_eq!(args.len(), 2);
                assert_eq!(args[0].as_register(), Some(Reg::A));
                assert_eq!(args[1].as_number(), Some(5));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn label_prefix_and_suffix_forms() {
        let nodes = parse_program(":start SET A, 1\nloop: SUB A, 1").expect("parse");
        assert!(matches!(&nodes[0].kind, NodeKind::Label(n) if n == "start"));
        assert!(matches!(&nodes[2].kind, NodeKind::Label(n) if n == "loop"));
        assert_eq!(nodes.len(), 4);
    }

    #[test]
    fn operator_runs_become_unordered_chains() {
        let node = parse_one("DAT 1 + 2 * 3");
        let args = match node.kind {
            NodeKind::Data(args) => args,
            other => panic!("unexpected: {other:?}"),
        };
        match &args[0].kind {
            NodeKind::Unordered { link, right, .. } => {
                assert_eq!(link.op, BinaryOp::Add);
                assert!(matches!(
                    &right.kind,
                    NodeKind::Unordered { link, .. } if link.op == BinaryOp::Mul
                ));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn multiplication_outranks_addition() {
        assert!(chain_link(BinaryOp::Mul).priority > chain_link(BinaryOp::Add).priority);
        assert!(chain_link(BinaryOp::Add).priority > chain_link(BinaryOp::BitOr).priority);
    }

    #[test]
    fn subtraction_is_partial_with_add_inverse() {
        let link = chain_link(BinaryOp::Sub);
        assert_eq!(link.reorder, Reorder::Partial);
        assert_eq!(link.inverse, Some(BinaryOp::Add));
    }

    #[test]
    fn indirect_operand() {
        let node = parse_one("SET [SP + 2], A");
        match node.kind {
            NodeKind::Operation { args, .. } => {
                assert!(matches!(args[0].kind, NodeKind::Indirect(_)));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn macro_definition_with_params() {
        let node = parse_one(".macro save(reg, slot)\nSET [slot], reg\n.endmacro");
        match node.kind {
            NodeKind::MacroDef {
                name,
                params,
                contents,
            } => {
                assert_eq!(name, "save");
                assert_eq!(params, vec!["reg".to_string(), "slot".to_string()]);
                assert_eq!(contents.len(), 1);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unterminated_macro_is_an_error() {
        let err = parse_program(".macro broken\nSET A, 1").expect_err("must fail");
        assert!(err.message.contains("endmacro"));
    }

    #[test]
    fn equate_and_directives() {
        let nodes = parse_program(".equ SIZE, 0x20\n.org 0x1000\n.align 8\n.bss SIZE").expect("parse");
        assert!(matches!(&nodes[0].kind, NodeKind::Equate { name, .. } if name == "SIZE"));
        assert!(matches!(nodes[1].kind, NodeKind::Org(_)));
        assert!(matches!(nodes[2].kind, NodeKind::Align(_)));
        assert!(matches!(nodes[3].kind, NodeKind::Bss(_)));
    }

    #[test]
    fn include_directive_forms() {
        let nodes = parse_program(".include \"lib.asm\"\n.include bin \"font.bin\"").expect("parse");
        assert!(matches!(
            &nodes[0].kind,
            NodeKind::Include { format: IncludeFormat::Source, path } if path == "lib.asm"
        ));
        assert!(matches!(
            &nodes[1].kind,
            NodeKind::Include { format: IncludeFormat::Binary, path } if path == "font.bin"
        ));
    }

    #[test]
    fn unary_and_paren_expressions() {
        let node = parse_one("DAT -(2 + 3), ~0, &addr");
        match node.kind {
            NodeKind::Data(args) => {
                assert!(matches!(
                    &args[0].kind,
                    NodeKind::Unary { op: UnaryOp::Neg, value } if matches!(value.kind, NodeKind::Paren(_))
                ));
                assert!(matches!(args[1].kind, NodeKind::Unary { op: UnaryOp::Not, .. }));
                assert!(matches!(
                    args[2].kind,
                    NodeKind::Unary { op: UnaryOp::AddrOf, .. }
                ));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn positions_reach_nodes() {
        let nodes = parse_program("SET A, 1\n  ADD B, 2").expect("parse");
        assert_eq!(nodes[0].line, 1);
        assert_eq!(nodes[1].line, 2);
        assert_eq!(nodes[1].column, 3);
    }

    #[test]
    fn syntax_error_carries_position() {
        let err = parse_program("SET A, )").expect_err("must fail");
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 8);
    }
}
