//! The `setup` command (§6): one-shot, best-effort project configuration.
//!
//! Out of the controller's core scope (spec.md §1) — only its exit contract
//! is specified. This writes a config file registering the server and
//! appends an idempotent convention block to the project's agent-instruction
//! file. It never touches flow state, never invokes an LLM, and never writes
//! skills/memory markdown beyond the one marked block below.

use anyhow::Result;
use std::path::Path;

use crate::cli::SetupArgs;
use crate::config::Config;

const BLOCK_BEGIN: &str = "<!-- stratum:begin -->";
const BLOCK_END: &str = "<!-- stratum:end -->";

/// Runs project setup. Always returns exit code 0 (best-effort, no core
/// error class to distinguish here); failures surface as `anyhow::Error`.
pub async fn run(args: SetupArgs) -> Result<u8> {
    let project_dir = args
        .project_dir
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| ".".into()));

    let config = Config::default();
    let config_path = project_dir.join(".stratum").join("config.toml");
    config.save_to_file(&config_path)?;
    println!("wrote config: {}", config_path.display());

    let instructions_path = find_or_create_instruction_file(&project_dir)?;
    upsert_convention_block(&instructions_path, &config)?;
    println!("updated agent instructions: {}", instructions_path.display());

    Ok(0)
}

/// Prefer an existing `AGENTS.md` or `CLAUDE.md`; otherwise create `AGENTS.md`.
fn find_or_create_instruction_file(project_dir: &Path) -> Result<std::path::PathBuf> {
    for candidate in ["AGENTS.md", "CLAUDE.md"] {
        let path = project_dir.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    let path = project_dir.join("AGENTS.md");
    std::fs::write(&path, "")?;
    Ok(path)
}

/// Idempotently insert or replace the marked convention block describing how
/// to drive the controller via its four MCP tools.
fn upsert_convention_block(path: &Path, config: &Config) -> Result<()> {
    let existing = std::fs::read_to_string(path).unwrap_or_default();
    let block = convention_block(config);

    let updated = match (existing.find(BLOCK_BEGIN), existing.find(BLOCK_END)) {
        (Some(start), Some(end)) if end > start => {
            let end = end + BLOCK_END.len();
            format!("{}{}{}", &existing[..start], block, &existing[end..])
        }
        _ => {
            if existing.is_empty() {
                block
            } else {
                format!("{existing}\n\n{block}")
            }
        }
    };

    std::fs::write(path, updated)?;
    Ok(())
}

fn convention_block(config: &Config) -> String {
    format!(
        "{BLOCK_BEGIN}\n\
         ## Stratum MCP controller\n\n\
         Register `{name}` (command: `{command}`) as an MCP server and drive flows \
         through its four tools:\n\n\
         - `validate(spec_text)` — check a flow spec before planning.\n\
         - `plan(spec_text, flow_name, inputs)` — create a flow, get the first step to run.\n\
         - `step_done(flow_id, step_id, result)` — report a step's result, get the next one.\n\
         - `audit(flow_id)` — fetch the ordered trace of completed steps.\n\
         {BLOCK_END}",
        name = config.server.name,
        command = config.server.command,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn setup_creates_config_and_instructions_file() {
        let dir = tempfile::tempdir().unwrap();
        let code = run(SetupArgs {
            project_dir: Some(dir.path().to_path_buf()),
        })
        .await
        .unwrap();
        assert_eq!(code, 0);

        assert!(dir.path().join(".stratum/config.toml").exists());
        let instructions = std::fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();
        assert!(instructions.contains("Stratum MCP controller"));
    }

    #[tokio::test]
    async fn setup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let args = || SetupArgs {
            project_dir: Some(dir.path().to_path_buf()),
        };

        run(args()).await.unwrap();
        let first = std::fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();
        run(args()).await.unwrap();
        let second = std::fs::read_to_string(dir.path().join("AGENTS.md")).unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn setup_prefers_existing_instruction_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("CLAUDE.md"), "# Project notes\n").unwrap();

        run(SetupArgs {
            project_dir: Some(dir.path().to_path_buf()),
        })
        .await
        .unwrap();

        assert!(!dir.path().join("AGENTS.md").exists());
        let instructions = std::fs::read_to_string(dir.path().join("CLAUDE.md")).unwrap();
        assert!(instructions.contains("Project notes"));
        assert!(instructions.contains("Stratum MCP controller"));
    }
}
