// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// Shared helpers for CLI integration tests.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

static DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh scratch directory for one test.
pub fn scratch_dir() -> PathBuf {
    let mut dir = std::env::temp_dir();
    dir.push(format!(
        "wordforge-cli-{}-{}",
        std::process::id(),
        DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Run the assembler binary with the given arguments.
pub fn run_wordforge(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wordforge"))
        .args(args)
        .env("NO_COLOR", "1")
        .output()
        .expect("spawn wordforge")
}

pub fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}
