use assert_cmd::Command;

#[test]
fn chat_classifies_and_prints_a_workflow_id() {
    let mut cmd = Command::cargo_bin("pinion").unwrap();
    cmd.arg("chat").arg("please show me the sprint tickets");
    cmd.assert().success().stdout(predicates::str::contains("workflow:"));
}

#[test]
fn list_prints_an_empty_workflow_list_on_a_fresh_run() {
    let mut cmd = Command::cargo_bin("pinion").unwrap();
    cmd.arg("list");
    cmd.assert().success().stdout(predicates::str::contains("\"total\": 0"));
}

#[test]
fn status_of_an_unknown_workflow_fails() {
    let mut cmd = Command::cargo_bin("pinion").unwrap();
    cmd.arg("status").arg("does-not-exist");
    cmd.assert().failure();
}

#[test]
fn completions_prints_a_nonempty_script() {
    let mut cmd = Command::cargo_bin("pinion").unwrap();
    cmd.arg("completions").arg("bash");
    cmd.assert().success();
}
