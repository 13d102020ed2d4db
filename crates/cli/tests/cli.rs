use std::io::Write;

use assert_cmd::Command;
use predicates::str::contains;

fn jade() -> Command {
  Command::cargo_bin("jade").unwrap()
}

#[test]
fn empty_stdin_compiles_to_empty_output() {
  jade()
    .write_stdin("")
    .assert()
    .success()
    .stdout("");
}

#[test]
fn compiles_a_source_file_to_stdout() {
  let mut file = tempfile::NamedTempFile::new().unwrap();
  writeln!(file, "p Hello").unwrap();

  jade()
    .arg(file.path())
    .assert()
    .success()
    .stdout("<p>Hello</p>\n");
}

#[test]
fn writes_to_the_output_path_when_given() {
  let mut input = tempfile::NamedTempFile::new().unwrap();
  writeln!(input, "p Hi").unwrap();
  let output = tempfile::NamedTempFile::new().unwrap();

  jade()
    .arg(input.path())
    .arg("-o")
    .arg(output.path())
    .assert()
    .success()
    .stdout("");

  let written = std::fs::read_to_string(output.path()).unwrap();
  assert_eq!(written, "<p>Hi</p>\n");
}

#[test]
fn bad_indentation_prints_a_diagnostic_and_exits_nonzero() {
  jade()
    .env("NO_COLOR", "1")
    .write_stdin("div\n  p a\n b\n")
    .assert()
    .failure()
    .stderr(contains("BadIndentation"));
}
