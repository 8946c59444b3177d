// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Command-line interface parsing and argument validation.

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser, ValueEnum};

use crate::assembler::error::{AsmError, AsmErrorKind, AsmRunError};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const LONG_ABOUT: &str = "DCPU-16 word assembler.

Assembles one or more source files to 16-bit word images. Complex operand
expressions are legalized into stack-temporary sequences; label-dependent
instruction sizes are resolved by iterative relaxation.

The default output is <input>.bin, big-endian words. With --words or --ast
and no -o, no file is written.";

#[derive(Parser, Debug)]
#[command(
    name = "wordforge",
    version = VERSION,
    about = "DCPU-16 assembler with expression legalization and address relaxation",
    long_about = LONG_ABOUT
)]
pub struct Cli {
    #[arg(value_name = "FILE", num_args = 1..)]
    pub inputs: Vec<PathBuf>,
    #[arg(
        short = 'o',
        long = "output",
        value_name = "FILE",
        long_help = "Write the assembled image to FILE. Only valid with a single input; \
                     defaults to the input name with a .bin extension."
    )]
    pub output: Option<PathBuf>,
    #[arg(
        long = "little-endian",
        action = ArgAction::SetTrue,
        long_help = "Serialize output words little-endian instead of the default big-endian."
    )]
    pub little_endian: bool,
    #[arg(
        long = "words",
        action = ArgAction::SetTrue,
        long_help = "Print the assembled words as a hex dump to stdout."
    )]
    pub words: bool,
    #[arg(
        long = "ast",
        action = ArgAction::SetTrue,
        long_help = "Parse only: dump the syntax tree as JSON to stdout and skip assembly."
    )]
    pub ast: bool,
    #[arg(
        long = "forbid-complex",
        action = ArgAction::SetTrue,
        long_help = "Treat operands that would need legalization as errors instead of \
                     rewriting them into stack-temporary sequences."
    )]
    pub forbid_complex: bool,
    #[arg(
        long = "format",
        value_enum,
        default_value_t = OutputFormat::Text,
        long_help = "Select diagnostics output format. text is default; json emits one \
                     machine-readable object per diagnostic."
    )]
    pub format: OutputFormat,
    #[arg(
        short = 'q',
        long = "quiet",
        action = ArgAction::SetTrue,
        long_help = "Suppress diagnostic output for successful runs."
    )]
    pub quiet: bool,
    #[arg(
        short = 'w',
        long = "no-warn",
        action = ArgAction::SetTrue,
        long_help = "Suppress warning diagnostics."
    )]
    pub no_warn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Validated run configuration.
pub struct CliConfig {
    pub inputs: Vec<PathBuf>,
    pub output: Option<PathBuf>,
    pub little_endian: bool,
    pub dump_words: bool,
    pub dump_ast: bool,
    pub forbid_complex: bool,
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub emit_warnings: bool,
}

pub fn validate_cli(cli: &Cli) -> Result<CliConfig, AsmRunError> {
    if cli.inputs.is_empty() {
        return Err(cli_error("No input files"));
    }
    if cli.output.is_some() && cli.inputs.len() > 1 {
        return Err(cli_error("-o/--output requires a single input file"));
    }
    if cli.ast && cli.output.is_some() {
        return Err(cli_error("--ast does not produce an image; -o is not valid"));
    }
    Ok(CliConfig {
        inputs: cli.inputs.clone(),
        output: cli.output.clone(),
        little_endian: cli.little_endian,
        dump_words: cli.words,
        dump_ast: cli.ast,
        forbid_complex: cli.forbid_complex,
        output_format: cli.format,
        quiet: cli.quiet,
        emit_warnings: !cli.no_warn,
    })
}

/// Where the image for `input` goes, if anywhere.
pub fn output_path_for(input: &Path, config: &CliConfig) -> Option<PathBuf> {
    if config.dump_ast {
        return None;
    }
    match &config.output {
        Some(path) => Some(path.clone()),
        // Dump-only invocations do not write an image unless asked.
        None if config.dump_words => None,
        None => Some(input.with_extension("bin")),
    }
}

fn cli_error(message: &str) -> AsmRunError {
    AsmRunError::new(
        AsmError::new(AsmErrorKind::Cli, message, None),
        Vec::new(),
        Vec::new(),
    )
}
