use assert_cmd::Command;
use predicates::prelude::*;

fn iroca() -> Command {
    let mut cmd = Command::cargo_bin("iroca").unwrap();
    // Keep the environment from pointing at real artifacts or servers.
    cmd.env_remove("IROCA_MODEL_DIR")
        .env_remove("OLLAMA_URL")
        .env_remove("IROCA_CHAT_MODEL");
    cmd
}

fn sample_models() -> String {
    format!("{}/sample_models", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn test_cli_help() {
    iroca()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: iroca <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("predict"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("labels"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_serve_help() {
    iroca()
        .arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: iroca serve"))
        .stdout(predicate::str::contains("--port <PORT>"))
        .stdout(predicate::str::contains("--model-dir <MODEL_DIR>"))
        .stdout(predicate::str::contains("--fallback <FALLBACK>"))
        .stdout(predicate::str::contains("--ollama-url <OLLAMA_URL>"));
}

#[test]
fn test_cli_no_command() {
    // Running without a command should show help/usage
    iroca()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: iroca <COMMAND>"));
}

#[test]
fn test_cli_labels() {
    iroca()
        .arg("labels")
        .assert()
        .success()
        .stdout(predicate::str::contains("[Produto]"))
        .stdout(predicate::str::contains("São Paulo -> sao_paulo"))
        .stdout(predicate::str::contains("Março -> marco"));
}

#[test]
fn test_cli_predict_with_demo_fallback() {
    let dir = tempfile::tempdir().unwrap();
    iroca()
        .args(["predict", "--product", "soja", "--month", "Janeiro", "--state", "São Paulo", "--area", "1000"])
        .arg("--model-dir")
        .arg(dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("920.00 hectares"))
        .stdout(predicate::str::contains("modelo de demonstração"));
}

#[test]
fn test_cli_predict_fail_strategy() {
    let dir = tempfile::tempdir().unwrap();
    iroca()
        .args(["predict", "--product", "Soja", "--month", "Maio", "--state", "Bahia", "--area", "10"])
        .arg("--model-dir")
        .arg(dir.path())
        .args(["--fallback", "fail"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load model artifacts"));
}

#[test]
fn test_cli_predict_with_sample_artifacts() {
    iroca()
        .args(["predict", "--product", "Soja", "--month", "Maio", "--state", "Bahia", "--area", "10000"])
        .args(["--model-dir", &sample_models(), "--fallback", "fail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("9,650.00 hectares"))
        .stdout(predicate::str::contains("demonstração").not());
}

#[test]
fn test_cli_predict_unknown_label() {
    iroca()
        .args(["predict", "--product", "Café", "--month", "Maio", "--state", "Bahia", "--area", "10"])
        .args(["--model-dir", &sample_models()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown product value"));
}

#[test]
fn test_cli_predict_negative_area() {
    iroca()
        .args(["predict", "--product", "Soja", "--month", "Maio", "--state", "Bahia", "--area", "-5"])
        .args(["--model-dir", &sample_models()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("planted area must be a finite, non-negative number"))
        .stderr(predicate::str::contains("unexpected argument").not());
}
