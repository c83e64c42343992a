//! Environment preflight.
//!
//! Nothing launches until the interpreter, the virtualenv, and the `.env`
//! file with its required key names are in place. Values are never
//! inspected, only presence.

use std::collections::HashSet;
use std::fs;

use tracing::{info, warn};

use crate::config::SupervisorConfig;
use crate::error::{ButlerError, Result};

/// Key names that must appear in `.env` before any service starts.
pub const REQUIRED_ENV_KEYS: [&str; 3] = ["UPBIT_ACCESS_KEY", "UPBIT_SECRET_KEY", "GEMINI_API_KEY"];

/// Run every preflight check; the first failure aborts the start.
pub fn preflight(config: &SupervisorConfig) -> Result<()> {
    ensure_interpreter(config)?;
    ensure_env_file(config)?;
    validate_env_keys(config)?;
    Ok(())
}

/// The virtualenv interpreter must exist.
pub fn ensure_interpreter(config: &SupervisorConfig) -> Result<()> {
    let python = config.python_path();
    if !python.exists() {
        return Err(ButlerError::Environment(format!(
            "python interpreter not found at {} (is the virtualenv set up?)",
            python.display()
        )));
    }
    Ok(())
}

/// `.env` must exist; copy the template into place when it is missing, and
/// refuse to start when the template is missing too.
pub fn ensure_env_file(config: &SupervisorConfig) -> Result<()> {
    let env_file = config.env_file();
    if env_file.exists() {
        return Ok(());
    }

    let template = config.env_template();
    if !template.exists() {
        return Err(ButlerError::Environment(format!(
            "neither {} nor the template {} exists",
            env_file.display(),
            template.display()
        )));
    }

    fs::copy(&template, &env_file)?;
    warn!(
        "Copied {} to {}; fill in the API keys before trading",
        template.display(),
        env_file.display()
    );
    Ok(())
}

/// Every required key name must be present in `.env`.
pub fn validate_env_keys(config: &SupervisorConfig) -> Result<()> {
    let env_file = config.env_file();
    let iter = dotenvy::from_path_iter(&env_file).map_err(|e| {
        ButlerError::Environment(format!("cannot read {}: {e}", env_file.display()))
    })?;

    let mut present = HashSet::new();
    for item in iter {
        let (key, _) = item.map_err(|e| {
            ButlerError::Environment(format!("malformed line in {}: {e}", env_file.display()))
        })?;
        present.insert(key);
    }

    let missing: Vec<&str> = REQUIRED_ENV_KEYS
        .iter()
        .filter(|k| !present.contains(**k))
        .copied()
        .collect();

    if missing.is_empty() {
        info!("Environment file validated");
        Ok(())
    } else {
        Err(ButlerError::Environment(format!(
            "missing required keys in {}: {}",
            env_file.display(),
            missing.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config_rooted_at(root: &Path) -> SupervisorConfig {
        let mut config = SupervisorConfig::default();
        config.install_root = root.to_path_buf();
        config
    }

    #[test]
    fn complete_env_file_passes() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(".env"),
            "UPBIT_ACCESS_KEY=a\nUPBIT_SECRET_KEY=b\nGEMINI_API_KEY=c\n",
        )
        .expect("write");

        let config = config_rooted_at(dir.path());
        assert!(validate_env_keys(&config).is_ok());
    }

    #[test]
    fn missing_key_is_named_in_the_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join(".env"), "UPBIT_ACCESS_KEY=a\n").expect("write");

        let config = config_rooted_at(dir.path());
        let err = validate_env_keys(&config).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("UPBIT_SECRET_KEY"));
        assert!(message.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn template_is_copied_into_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            dir.path().join(".env.example"),
            "UPBIT_ACCESS_KEY=\nUPBIT_SECRET_KEY=\nGEMINI_API_KEY=\n",
        )
        .expect("write");

        let config = config_rooted_at(dir.path());
        assert!(ensure_env_file(&config).is_ok());
        assert!(dir.path().join(".env").exists());
    }

    #[test]
    fn missing_template_refuses_start() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = config_rooted_at(dir.path());
        assert!(matches!(
            ensure_env_file(&config),
            Err(ButlerError::Environment(_))
        ));
    }
}
