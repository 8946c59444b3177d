// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Word-stream collection and byte serialization.
//!
//! After the relaxation loop finishes, the program is a sequence of `data`
//! blocks (plus labels and `org` markers, which emit nothing). Their words,
//! in program order, are the machine image.

use crate::assembler::error::{AsmErrorKind, BuildError};
use crate::core::ast::{Node, NodeKind};
use crate::core::isa::mask_word;

/// Collect the final 16-bit word stream.
pub fn words(nodes: &[Node]) -> Result<Vec<u16>, BuildError> {
    let mut out = Vec::new();
    for node in nodes {
        if let NodeKind::Data(args) = &node.kind {
            for arg in args {
                match arg.as_number() {
                    Some(value) => out.push(mask_word(value)),
                    None => {
                        return Err(BuildError::new(
                            AsmErrorKind::Assembler,
                            "Unresolved value in data block",
                            None,
                            arg,
                        ))
                    }
                }
            }
        }
    }
    Ok(out)
}

/// Serialize words to bytes, big-endian unless asked otherwise.
pub fn to_bytes(words: &[u16], little_endian: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 2);
    for word in words {
        let bytes = if little_endian {
            word.to_le_bytes()
        } else {
            word.to_be_bytes()
        };
        out.extend_from_slice(&bytes);
    }
    out
}

/// Hex dump for the `--words` flag, eight words per line.
pub fn format_words(words: &[u16]) -> String {
    let mut out = String::new();
    for (index, word) in words.iter().enumerate() {
        if index > 0 {
            out.push(if index % 8 == 0 { '\n' } else { ' ' });
        }
        out.push_str(&format!("{word:04x}"));
    }
    out
}
