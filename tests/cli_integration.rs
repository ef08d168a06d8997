use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixture").join(name)
}

fn run_scim_filter(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_scim-filter"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run scim-filter")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).expect("json line"))
        .collect()
}

#[test]
fn parses_arguments_as_json_lines() {
    let output = run_scim_filter(&[r#"userName eq "bjensen""#, "title pr"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["name"], "arg1");
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[0]["expression"]["type"], "comparison");
    assert_eq!(lines[0]["expression"]["path"]["name"], "userName");
    assert_eq!(lines[0]["expression"]["operator"], "eq");
    assert_eq!(lines[0]["expression"]["value"], "bjensen");
    assert_eq!(lines[1]["expression"]["operator"], "pr");
    assert!(lines[1]["expression"].get("value").is_none());
}

#[test]
fn rfc_examples_from_file() {
    let input = fixture_path("filters.txt");
    let output = run_scim_filter(&["--input", input.to_str().unwrap(), "--format", "text"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 13);
    assert!(lines[0].ends_with("filters.txt:2: userName eq \"bjensen\""));
    assert!(lines[10].ends_with(
        "userType ne \"Employee\" and not (emails co \"example.com\" or emails.value co \"example.org\")"
    ));
}

#[test]
fn rejected_filter_fails_with_diagnostics() {
    let output = run_scim_filter(&["title pr", "a eq 01"]);
    assert!(!output.status.success());

    let lines = json_lines(&output);
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["ok"], true);
    assert_eq!(lines[1]["ok"], false);
    assert_eq!(lines[1]["error"]["position"], 6);
    assert!(lines[1]["error"]["expected"]
        .as_array()
        .unwrap()
        .contains(&serde_json::json!("end of input")));

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 2 filters failed to parse"));
}

#[test]
fn settings_file_supplies_filters_and_depth() {
    let settings = fixture_path("settings.yaml");
    let output = run_scim_filter(&["--config", settings.to_str().unwrap(), "((title pr))"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let names: Vec<String> = json_lines(&output)
        .iter()
        .map(|line| line["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["arg1", "active_users", "work_emails"]);

    let output = run_scim_filter(&[
        "--config",
        settings.to_str().unwrap(),
        "--max-depth",
        "1",
        "((title pr))",
    ]);
    assert!(!output.status.success());
}

#[test]
fn yaml_output_from_stdin() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_scim-filter"))
        .args(["--input", "-", "--format", "yaml"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn scim-filter");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"emails[type eq \"work\"]\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let reports: serde_yaml::Value = serde_yaml::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["name"].as_str(), Some("stdin:1"));
    assert_eq!(reports[0]["expression"]["type"].as_str(), Some("value_path"));
    assert_eq!(
        reports[0]["expression"]["filter"]["path"]["name"].as_str(),
        Some("type")
    );
}

#[test]
fn settings_from_temp_file() {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    writeln!(file, "format: json\nfilters:\n  broken: 'title eq'").unwrap();

    let output = run_scim_filter(&["--config", file.path().to_str().unwrap()]);
    assert!(!output.status.success());
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["name"], "broken");
    assert_eq!(reports[0]["error"]["expected"][0], "whitespace");
}

#[test]
fn no_filters_is_an_error() {
    let output = run_scim_filter(&[]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No filters given"));
}

#[test]
fn long_chain_is_written_and_term_limit_applies() {
    let chain = vec!["id pr"; 5_000].join(" or ");
    let output = run_scim_filter(&[&chain]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches(r#""type":"logical""#).count(), 4_999);

    let output = run_scim_filter(&["--max-terms", "3", "a pr or b pr or c pr or d pr"]);
    assert!(!output.status.success());
    let lines = json_lines(&output);
    assert_eq!(lines[0]["error"]["position"], 21);
    assert!(
        lines[0]["error"]["message"]
            .as_str()
            .unwrap()
            .starts_with("too many and/or terms at position 21")
    );
}
