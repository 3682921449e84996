//! End-to-end tests driving the `rp` binary.

use assert_cmd::Command;
use assert_fs::{TempDir, prelude::*};
use predicates::prelude::*;

fn fixture() -> TempDir
{
    let tmp = TempDir::new().expect("tempdir");
    tmp.child("src/lib.rs")
        .write_str("pub fn answer() -> u32 {\n    42\n}\n")
        .expect("write lib.rs");
    tmp.child("src/main.rs")
        .write_str("fn main() {}\n")
        .expect("write main.rs");
    tmp.child("src/lib_test.rs")
        .write_str("#[test]\nfn t() {}\n")
        .expect("write lib_test.rs");
    tmp.child("README.md")
        .write_str("# demo\n")
        .expect("write README");
    tmp
}

fn rp() -> Command
{
    let mut cmd = Command::cargo_bin("rp").expect("binary built");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn select_prints_matching_paths_sorted()
{
    let tmp = fixture();
    rp().args(["select", "src/*.rs|!_test", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout("src/lib.rs\nsrc/main.rs\n");
}

#[test]
fn select_reports_line_ranges()
{
    let tmp = fixture();
    rp().args(["select", "=src/lib.rs#2,3", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout("src/lib.rs#2,3\n");
}

#[test]
fn select_json_output()
{
    let tmp = fixture();
    rp().args(["select", "src/main.rs", "--json", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dialect\": \"query\""))
        .stdout(predicate::str::contains("\"path\": \"src/main.rs\""));
}

#[test]
fn select_fzf_dialect()
{
    let tmp = fixture();
    rp().args(["select", "--fzf", "^src .rs$ !test", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout("src/lib.rs\nsrc/main.rs\n");
}

#[test]
fn select_bad_regex_fails_with_diagnostic()
{
    let tmp = fixture();
    rp().args(["select", "/[", "--root"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid regex"));
}

#[test]
fn render_repo_template_with_selection()
{
    let tmp = fixture();
    tmp.child("hello.md")
        .write_str("+++\nselect = \"=src/lib.rs\"\n+++\nFiles:\n{{ FileMap }}")
        .unwrap();

    rp().args(["render", "hello", "--quiet", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("`src/lib.rs`"))
        .stdout(predicate::str::contains("pub fn answer() -> u32 {"))
        .stdout(predicate::str::contains("fn main()").not());
}

#[test]
fn repo_layout_shadows_builtin_unless_system_addressed()
{
    let tmp = fixture();
    tmp.child("layouts/prompt.md")
        .write_str("REPO[{{ Content }}]")
        .unwrap();
    tmp.child("shadow.md")
        .write_str("---\nlayout = \"layouts/prompt\"\n---\nbody")
        .unwrap();
    tmp.child("system.md")
        .write_str("---\nlayout = \"<layouts/prompt>\"\n---\nbody")
        .unwrap();

    rp().args(["render", "shadow", "--quiet", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout("REPO[body]");

    rp().args(["render", "system", "--quiet", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("REPO").not())
        .stdout(predicate::str::contains("body"));
}

#[test]
fn render_default_template_with_content_to_file()
{
    let tmp = fixture();
    let out = tmp.child("out/prompt.md");
    let metrics = tmp.child("metrics.json");

    rp().args(["render", "--quiet", "-s", "src/main.rs", "-c", "text:Explain this", "--model", "approx", "--root"])
        .arg(tmp.path())
        .arg("-o")
        .arg(out.path())
        .arg("--metrics-json")
        .arg(metrics.path())
        .assert()
        .success()
        .stdout("");

    out.assert(predicate::str::starts_with("Explain this\n\n"));
    out.assert(predicate::str::contains("## Directory structure"));
    out.assert(predicate::str::contains("`src/main.rs`"));
    metrics.assert(predicate::str::contains("final:prompt"));
    metrics.assert(predicate::str::contains("file:src/main.rs"));
    metrics.assert(predicate::str::contains("user:text:Explain this"));
}

#[test]
fn render_prints_breakdown_to_stderr()
{
    let tmp = fixture();
    rp().args(["render", "--no-color", "-s", "src/lib.rs", "--model", "approx", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Tokens"))
        .stderr(predicate::str::contains("layouts/prompt.md"));
}

#[test]
fn render_missing_template_fails()
{
    let tmp = fixture();
    rp().args(["render", "nope", "--quiet", "--root"])
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn templates_lists_shadowed_builtins()
{
    let tmp = fixture();
    tmp.child("default.md")
        .write_str("mine")
        .unwrap();

    rp().args(["templates", "--no-color", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("builtin"))
        .stdout(predicate::str::contains("shadowed"))
        .stdout(predicate::str::contains("partials/tree.md"));
}

#[test]
fn tree_filters_with_query()
{
    let tmp = fixture();
    rp().args(["tree", "--no-color", "--dirtree", "*.md", "--root"])
        .arg(tmp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("README.md"))
        .stdout(predicate::str::contains("lib.rs").not());
}

#[test]
fn init_refuses_to_overwrite()
{
    let tmp = TempDir::new().unwrap();
    rp().args(["init", "--quiet"])
        .arg(tmp.path())
        .assert()
        .success();
    tmp.child("roughprompt.toml")
        .assert(predicate::str::contains("model = \"gpt-4o\""));

    rp().arg("init")
        .arg(tmp.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn completions_to_stdout()
{
    rp().args(["completions", "bash", "--stdout"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rp"));
}
