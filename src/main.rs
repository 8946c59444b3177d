// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// CLI entrypoint for wordforge.

use std::io::{self, Write};

use clap::Parser;
use serde_json::json;

use wordforge::assembler::cli::{validate_cli, Cli, OutputFormat};
use wordforge::assembler::error::{AsmRunError, AsmRunReport, Diagnostic, Severity};

struct DiagnosticsSink {
    writer: Box<dyn Write>,
}

impl DiagnosticsSink {
    fn stderr() -> Self {
        Self {
            writer: Box::new(io::stderr()),
        }
    }

    fn emit_line(&mut self, line: &str) {
        let _ = writeln!(self.writer, "{line}");
    }

    fn emit_report_diagnostics(
        &mut self,
        report: &AsmRunReport,
        diagnostics: &[Diagnostic],
        use_color: bool,
        format: OutputFormat,
    ) {
        for diag in diagnostics {
            self.emit_line(&format_diagnostic_line(
                diag,
                Some(report.source_lines()),
                use_color,
                format,
            ));
        }
    }

    fn emit_error_diagnostics(
        &mut self,
        err: &AsmRunError,
        diagnostics: &[Diagnostic],
        use_color: bool,
        format: OutputFormat,
    ) {
        for diag in diagnostics {
            self.emit_line(&format_diagnostic_line(
                diag,
                Some(err.source_lines()),
                use_color,
                format,
            ));
        }
    }
}

fn severity_to_str(severity: Severity) -> &'static str {
    match severity {
        Severity::Warning => "warning",
        Severity::Error => "error",
    }
}

fn format_diagnostic_line(
    diag: &Diagnostic,
    source_lines: Option<&[String]>,
    use_color: bool,
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Json {
        json!({
            "code": diag.code(),
            "severity": severity_to_str(diag.severity()),
            "message": diag.message(),
            "file": diag.file(),
            "line": diag.line(),
            "column": diag.column(),
        })
        .to_string()
    } else {
        diag.format_with_context(source_lines, use_color)
    }
}

fn main() {
    let cli = Cli::parse();
    let config = match validate_cli(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(1);
        }
    };

    let mut sink = DiagnosticsSink::stderr();
    let use_color = std::env::var("NO_COLOR").is_err();

    match wordforge::assembler::run_with_cli(&cli) {
        Ok(reports) => {
            if config.quiet {
                return;
            }
            for report in &reports {
                let diagnostics: Vec<Diagnostic> = report
                    .diagnostics()
                    .iter()
                    .filter(|diag| {
                        config.emit_warnings || diag.severity() != Severity::Warning
                    })
                    .cloned()
                    .collect();
                sink.emit_report_diagnostics(
                    report,
                    &diagnostics,
                    use_color,
                    config.output_format,
                );
            }
        }
        Err(err) => {
            let diagnostics: Vec<Diagnostic> = err
                .diagnostics()
                .iter()
                .filter(|diag| config.emit_warnings || diag.severity() != Severity::Warning)
                .cloned()
                .collect();
            sink.emit_error_diagnostics(&err, &diagnostics, use_color, config.output_format);
            if config.output_format != OutputFormat::Json {
                sink.emit_line(&err.to_string());
            }
            std::process::exit(1);
        }
    }
}
