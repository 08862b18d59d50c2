//! The offline `validate` command (§6): runs the parser+validator against a
//! file path (if one exists) or inline spec text, and terminates without
//! starting the server.

use anyhow::Result;
use chrono::Utc;
use serde_json::json;

use crate::cli::ValidateArgs;

/// Runs the offline validator. Returns the process exit code: 0 if the spec
/// is valid, 1 otherwise.
pub async fn run(args: ValidateArgs) -> Result<u8> {
    let spec_text = match std::fs::read_to_string(&args.path_or_text) {
        Ok(contents) => contents,
        Err(_) => args.path_or_text.clone(),
    };

    let (exit_code, envelope) = match stratum_core::parse_and_validate(&spec_text) {
        Ok(_) => {
            println!("OK");
            (0, json!({ "valid": true }))
        }
        Err(err) => {
            let envelope = json!({
                "success": false,
                "error_type": err.error_type(),
                "path": err.path(),
                "message": err.message(),
                "suggestion": err.suggestion(),
            });
            eprintln!("{}", serde_json::to_string_pretty(&envelope)?);
            (1, envelope)
        }
    };

    if let Some(report_path) = &args.report {
        write_report(report_path, &envelope)?;
    }

    Ok(exit_code)
}

fn write_report(path: &std::path::Path, envelope: &serde_json::Value) -> Result<()> {
    let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    let valid = envelope.get("success").is_none();

    let mut report = String::new();
    report.push_str("# Stratum spec validation report\n\n");
    report.push_str(&format!("Generated: {generated_at}\n\n"));
    if valid {
        report.push_str("Result: valid\n");
    } else {
        report.push_str("Result: invalid\n\n");
        report.push_str(&serde_json::to_string_pretty(envelope)?);
        report.push('\n');
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, report)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(path_or_text: &str) -> ValidateArgs {
        ValidateArgs {
            path_or_text: path_or_text.to_string(),
            report: None,
        }
    }

    #[tokio::test]
    async fn valid_inline_spec_exits_zero() {
        let spec = r#"
version: "0.1"
contracts:
  Out: { x: { type: integer } }
functions:
  f: { mode: compute, intent: "do work", input: {}, output: Out }
flows:
  main:
    input: {}
    output: Out
    steps: [{ id: s1, function: f, inputs: {} }]
"#;
        let code = run(args(spec)).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn malformed_inline_text_exits_one() {
        let code = run(args("not: [valid yaml")).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn file_path_is_preferred_over_inline_text() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("spec.yaml");
        std::fs::write(
            &file_path,
            r#"
version: "0.1"
contracts: {}
functions: {}
flows:
  main:
    input: {}
    output: Missing
    steps: [{ id: s1, function: missing, inputs: {} }]
"#,
        )
        .unwrap();

        let code = run(args(&file_path.to_string_lossy())).await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn report_flag_writes_diagnostic_file() {
        let dir = tempfile::tempdir().unwrap();
        let report_path = dir.path().join("report.md");
        let mut a = args("not: [valid yaml");
        a.report = Some(report_path.clone());

        let code = run(a).await.unwrap();
        assert_eq!(code, 1);
        let contents = std::fs::read_to_string(&report_path).unwrap();
        assert!(contents.contains("Result: invalid"));
    }
}
