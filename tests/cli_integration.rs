// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

// End-to-end tests driving the wordforge binary.

mod common;

use std::fs;

use common::{run_wordforge, scratch_dir, stderr_of, stdout_of};

#[test]
fn assembles_to_big_endian_bin_by_default() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    fs::write(&asm, ":start SET A, 5\nADD A, 1\nSET [start], A\n").expect("write");

    let output = run_wordforge(&[asm.to_str().expect("path")]);
    assert!(output.status.success(), "{}", stderr_of(&output));

    let bin = fs::read(dir.join("prog.bin")).expect("bin written");
    // 0x9801 0x8802 0x03C1 0x0000, big-endian.
    assert_eq!(
        bin,
        vec![0x98, 0x01, 0x88, 0x02, 0x03, 0xC1, 0x00, 0x00]
    );
}

#[test]
fn little_endian_flag_flips_byte_order() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    fs::write(&asm, "SET A, 5\n").expect("write");

    let output = run_wordforge(&["--little-endian", asm.to_str().expect("path")]);
    assert!(output.status.success(), "{}", stderr_of(&output));
    assert_eq!(fs::read(dir.join("prog.bin")).expect("bin"), vec![0x01, 0x98]);
}

#[test]
fn words_flag_dumps_hex_and_writes_no_image() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    fs::write(&asm, "SET A, 5\nDAT 0x1234\n").expect("write");

    let output = run_wordforge(&["--words", asm.to_str().expect("path")]);
    assert!(output.status.success(), "{}", stderr_of(&output));
    assert_eq!(stdout_of(&output).trim(), "9801 1234");
    assert!(!dir.join("prog.bin").exists());
}

#[test]
fn ast_flag_dumps_parse_tree_json() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    fs::write(&asm, "SET A, 5\n").expect("write");

    let output = run_wordforge(&["--ast", asm.to_str().expect("path")]);
    assert!(output.status.success(), "{}", stderr_of(&output));
    let value: serde_json::Value =
        serde_json::from_str(stdout_of(&output).trim()).expect("valid json");
    assert_eq!(value[0]["type"], "operation");
    assert_eq!(value[0]["name"], "SET");
}

#[test]
fn includes_resolve_relative_to_the_including_file() {
    let dir = scratch_dir();
    fs::write(dir.join("data.asm"), ":table DAT 1, 2, 3\n").expect("write");
    let asm = dir.join("main.asm");
    fs::write(&asm, "SET A, table\n.include \"data.asm\"\n").expect("write");

    let output = run_wordforge(&["--words", asm.to_str().expect("path")]);
    assert!(output.status.success(), "{}", stderr_of(&output));
    assert_eq!(stdout_of(&output).trim(), "8801 0001 0002 0003");
}

#[test]
fn errors_render_with_source_context_and_fail_the_run() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    fs::write(&asm, "SET A, 5\nFROB B, 1\n").expect("write");

    let output = run_wordforge(&[asm.to_str().expect("path")]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = stderr_of(&output);
    assert!(stderr.contains("Unrecognized opcode"), "{stderr}");
    assert!(stderr.contains("FROB B, 1"), "{stderr}");
    assert!(!dir.join("prog.bin").exists());
}

#[test]
fn json_format_emits_machine_readable_diagnostics() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    fs::write(&asm, "SET A, nowhere\n").expect("write");

    let output = run_wordforge(&["--format", "json", asm.to_str().expect("path")]);
    assert_eq!(output.status.code(), Some(1));
    let line = stderr_of(&output);
    let line = line.lines().next().expect("one diagnostic");
    let value: serde_json::Value = serde_json::from_str(line).expect("valid json");
    assert_eq!(value["severity"], "error");
    assert_eq!(value["code"], "asm306");
    assert_eq!(value["line"], 1);
}

#[test]
fn quiet_suppresses_warning_output() {
    let dir = scratch_dir();
    let asm = dir.join("prog.asm");
    let padding: Vec<&str> = vec!["0"; 29];
    fs::write(
        &asm,
        format!("SET A, b\nDAT {}\n:b DAT b\n", padding.join(", ")),
    )
    .expect("write");

    let noisy = run_wordforge(&[asm.to_str().expect("path")]);
    assert!(noisy.status.success(), "{}", stderr_of(&noisy));
    assert!(stderr_of(&noisy).contains("forcing long constants"));

    let quiet = run_wordforge(&["-q", asm.to_str().expect("path")]);
    assert!(quiet.status.success());
    assert!(stderr_of(&quiet).is_empty());
}
