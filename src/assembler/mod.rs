// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! DCPU-16 assembler - pipeline stages and run orchestration.
//!
//! The pipeline is a fixed sequence of tree-to-tree transforms over one
//! owned AST: reassociation, definition expansion, constant folding and
//! classification, verification, addressing-mode legalization, and the
//! relaxation loop that settles label-dependent instruction sizes before
//! encoding.

pub mod balance;
pub mod cli;
pub mod encode;
pub mod engine;
pub mod error;
pub mod estimate;
pub mod expand;
pub mod fold;
pub mod frontend;
pub mod lower;
pub mod output;
pub mod render;
pub mod verify;
#[cfg(test)]
mod tests;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use cli::{output_path_for, validate_cli, Cli, CliConfig};
use error::{AsmError, AsmErrorKind, AsmRunError, AsmRunReport, BuildError, Diagnostic};

pub use cli::VERSION;
pub use engine::{BuildOptions, Engine};

/// Assemble source text straight to words. Library entry point; include
/// directives are not resolved here (the verifier rejects them).
pub fn assemble_source(
    source: &str,
    options: BuildOptions,
) -> Result<(Vec<u16>, Vec<Diagnostic>), BuildError> {
    let nodes = crate::core::parser::parse_program(source)?;
    let mut engine = Engine::new(options);
    let tree = engine.build(nodes)?;
    let words = output::words(&tree)?;
    Ok((words, engine.take_diagnostics()))
}

/// Run the assembler with parsed command-line arguments.
pub fn run_with_cli(cli: &Cli) -> Result<Vec<AsmRunReport>, AsmRunError> {
    let config = validate_cli(cli)?;
    let mut reports = Vec::new();
    for input in &config.inputs {
        reports.push(run_one(input, &config)?);
    }
    Ok(reports)
}

fn run_one(input: &Path, config: &CliConfig) -> Result<AsmRunReport, AsmRunError> {
    let source = fs::read_to_string(input).map_err(|err| {
        AsmRunError::new(
            AsmError::new(
                AsmErrorKind::Io,
                "Cannot read file",
                Some(&format!("{} ({err})", input.display())),
            ),
            Vec::new(),
            Vec::new(),
        )
    })?;
    let source_lines: Arc<Vec<String>> =
        Arc::new(source.lines().map(str::to_string).collect());
    let file_name = input.display().to_string();
    let fail = |err: BuildError, diagnostics: Vec<Diagnostic>| {
        build_run_error(err, diagnostics, source_lines.clone(), &file_name)
    };

    if config.dump_ast {
        let nodes =
            crate::core::parser::parse_program(&source).map_err(|err| fail(err.into(), Vec::new()))?;
        println!("{}", render::to_json_all(&nodes));
        return Ok(AsmRunReport::new(Vec::new(), Vec::new(), source_lines));
    }

    let nodes = frontend::load_program(input).map_err(|err| fail(err, Vec::new()))?;
    let mut engine = Engine::new(BuildOptions {
        forbid_complex: config.forbid_complex,
    });
    let tree = match engine.build(nodes) {
        Ok(tree) => tree,
        Err(err) => {
            let diagnostics = engine.take_diagnostics();
            return Err(fail(err, diagnostics));
        }
    };
    let words = output::words(&tree).map_err(|err| fail(err, engine.take_diagnostics()))?;

    if config.dump_words {
        println!("{}", output::format_words(&words));
    }
    if let Some(out_path) = output_path_for(input, config) {
        let bytes = output::to_bytes(&words, config.little_endian);
        fs::write(&out_path, bytes).map_err(|err| {
            AsmRunError::new(
                AsmError::new(
                    AsmErrorKind::Io,
                    "Error opening file for write",
                    Some(&format!("{} ({err})", out_path.display())),
                ),
                engine.take_diagnostics(),
                source_lines.clone(),
            )
        })?;
    }

    let diagnostics = engine
        .take_diagnostics()
        .into_iter()
        .map(|diag| diag.with_file(Some(file_name.clone())))
        .collect();
    Ok(AsmRunReport::new(words, diagnostics, source_lines))
}

fn build_run_error(
    err: BuildError,
    mut diagnostics: Vec<Diagnostic>,
    source_lines: Arc<Vec<String>>,
    file_name: &str,
) -> AsmRunError {
    let error = err.error().clone();
    diagnostics.push(err.into_diagnostic().with_file(Some(file_name.to_string())));
    AsmRunError::new(error, diagnostics, source_lines)
}
