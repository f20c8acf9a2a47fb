//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the devpilot-core domain logic through `AppState`.

pub mod schedule;
pub mod server;
pub mod suggest;
pub mod workflow;

use devpilot_core::state::AppState;

/// Default database location: `<data dir>/devpilot/devpilot.db`, or the
/// working directory when no data directory is known.
pub fn default_db_path() -> String {
    dirs::data_dir()
        .map(|dir| dir.join("devpilot").join("devpilot.db"))
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| "devpilot.db".to_string())
}

/// Initialize a shared `AppState` from the given SQLite database path.
///
/// Agents are called over HTTP with credentials from the environment
/// (`.env.local` / `.env` are read first).
pub async fn init_state(db_path: &str, engine_config: Option<&str>) -> AppState {
    load_dotenv();

    let config = devpilot_server::load_engine_config(engine_config).unwrap_or_else(|e| {
        eprintln!("{}", e);
        std::process::exit(1);
    });

    devpilot_server::create_app_state(db_path, config)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Failed to initialize '{}': {}", db_path, e);
            std::process::exit(1);
        })
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}

/// Load .env and .env.local files for environment variables.
pub(crate) fn load_dotenv() {
    // .env.local first (higher priority), then .env
    for filename in &[".env.local", ".env"] {
        let path = std::path::Path::new(filename);
        let Ok(content) = std::fs::read_to_string(path) else {
            continue;
        };
        for (key, value) in content.lines().filter_map(parse_env_line) {
            // Existing env vars take priority
            if std::env::var(&key).is_err() {
                std::env::set_var(&key, &value);
            }
        }
        tracing::info!("[CLI] Loaded environment from '{}'", filename);
    }
}

fn parse_env_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    let value = if value.len() >= 2
        && ((value.starts_with('"') && value.ends_with('"'))
            || (value.starts_with('\'') && value.ends_with('\'')))
    {
        &value[1..value.len() - 1]
    } else {
        value
    };
    Some((key.trim().to_string(), value.to_string()))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_env_line() {
        assert_eq!(
            parse_env_line("ANTHROPIC_API_KEY=\"sk-test\""),
            Some(("ANTHROPIC_API_KEY".into(), "sk-test".into()))
        );
        assert_eq!(
            parse_env_line(" DEVPILOT_AGENT_MODEL = 'model-x' "),
            Some(("DEVPILOT_AGENT_MODEL".into(), "model-x".into()))
        );
        assert_eq!(parse_env_line("# comment"), None);
        assert_eq!(parse_env_line("NOEQUALS"), None);
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a-very-long-name", 6), "a-ver…");
    }
}
