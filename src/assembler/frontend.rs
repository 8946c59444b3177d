// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Source loading and include splicing.
//!
//! `.include "file"` splices the parsed contents of another source file
//! into the node stream, relative to the including file. `.include bin
//! "file"` loads raw big-endian words as a data block. Cycles are fatal.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::core::ast::{IncludeFormat, Node, NodeKind};
use crate::core::parser::parse_program;

/// Load and parse a source file with all includes resolved.
pub fn load_program(path: &Path) -> Result<Vec<Node>, BuildError> {
    let mut active = HashSet::new();
    load_file(path, &mut active)
}

fn load_file(path: &Path, active: &mut HashSet<PathBuf>) -> Result<Vec<Node>, BuildError> {
    let canonical = fs::canonicalize(path)
        .map_err(|err| io_error("Cannot resolve file", path, &err.to_string()))?;
    if !active.insert(canonical.clone()) {
        return Err(BuildError::at(
            AsmErrorKind::Io,
            "Include cycle detected",
            Some(&path.display().to_string()),
            0,
        ));
    }

    let source = fs::read_to_string(path)
        .map_err(|err| io_error("Cannot read file", path, &err.to_string()))?;
    let nodes = parse_program(&source)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut out = Vec::new();
    for node in nodes {
        let (line, column) = (node.line, node.column);
        match node.kind {
            NodeKind::Include {
                format: IncludeFormat::Source,
                path: rel,
            } => {
                out.extend(load_file(&dir.join(&rel), active)?);
            }
            NodeKind::Include {
                format: IncludeFormat::Binary,
                path: rel,
            } => {
                let target = dir.join(&rel);
                let bytes = fs::read(&target)
                    .map_err(|err| io_error("Cannot read file", &target, &err.to_string()))?;
                let args = bytes
                    .chunks(2)
                    .map(|chunk| {
                        let word = ((chunk[0] as u16) << 8)
                            | chunk.get(1).copied().unwrap_or(0) as u16;
                        Node::new(NodeKind::Number(word as i64), line, column)
                    })
                    .collect();
                out.push(Node::new(NodeKind::Data(args), line, column));
            }
            kind => out.push(Node::new(kind, line, column)),
        }
    }

    active.remove(&canonical);
    Ok(out)
}

fn io_error(msg: &str, path: &Path, detail: &str) -> BuildError {
    BuildError::at(
        AsmErrorKind::Io,
        msg,
        Some(&format!("{} ({detail})", path.display())),
        0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn scratch_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "wordforge-test-{}-{}",
            std::process::id(),
            DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn source_includes_splice_in_place() {
        let dir = scratch_dir();
        fs::write(dir.join("lib.asm"), ":helper DAT 7\n").expect("write");
        fs::write(
            dir.join("main.asm"),
            "SET A, helper\n.include \"lib.asm\"\n",
        )
        .expect("write");
        let nodes = load_program(&dir.join("main.asm")).expect("load");
        assert_eq!(nodes.len(), 3);
        assert!(matches!(&nodes[1].kind, NodeKind::Label(n) if n == "helper"));
    }

    #[test]
    fn binary_includes_become_data_blocks() {
        let dir = scratch_dir();
        fs::write(dir.join("blob.bin"), [0x12, 0x34, 0x56]).expect("write");
        fs::write(dir.join("main.asm"), ".include bin \"blob.bin\"\n").expect("write");
        let nodes = load_program(&dir.join("main.asm")).expect("load");
        match &nodes[0].kind {
            NodeKind::Data(args) => {
                let words: Vec<_> = args.iter().map(|a| a.as_number()).collect();
                // Odd trailing byte pads to a full word.
                assert_eq!(words, vec![Some(0x1234), Some(0x5600)]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn include_cycles_are_fatal() {
        let dir = scratch_dir();
        fs::write(dir.join("a.asm"), ".include \"b.asm\"\n").expect("write");
        fs::write(dir.join("b.asm"), ".include \"a.asm\"\n").expect("write");
        let err = load_program(&dir.join("a.asm")).expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::Io);
        assert!(err.error().message().contains("cycle"));
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = scratch_dir();
        let err = load_program(&dir.join("absent.asm")).expect_err("must fail");
        assert_eq!(err.kind(), AsmErrorKind::Io);
    }
}
