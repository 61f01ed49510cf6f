//! Configuration loading
//!
//! Sources, lowest precedence first: built-in defaults, the TOML file
//! (`--config` or `<config_dir>/hijacklab/config.toml`), then
//! `HIJACKLAB__*` environment variables (`HIJACKLAB__PROBE__TIMEOUT_SECS=8`).

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use std::path::PathBuf;
use tracing::debug;

use hijacklab_core::domain::LabConfig;

const ENV_PREFIX: &str = "HIJACKLAB";
const ENV_SEPARATOR: &str = "__";

/// `<config_dir>/hijacklab/config.toml`, if the platform has a config dir
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "hijacklab").map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load and validate the lab configuration
///
/// An explicit `path` must exist; the default location is optional.
pub fn load(path: Option<&str>) -> Result<LabConfig> {
    let mut builder = Config::builder();

    match path {
        Some(path) => {
            let expanded = shellexpand::tilde(path).into_owned();
            debug!(path = %expanded, "Loading configuration file");
            builder = builder.add_source(
                File::with_name(&expanded)
                    .format(FileFormat::Toml)
                    .required(true),
            );
        }
        None => {
            if let Some(default) = default_path() {
                debug!(path = %default.display(), "Looking for default configuration file");
                builder = builder.add_source(
                    File::from(default)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("attach_command")
            .with_list_parse_key("shell")
            .with_list_parse_key("accepted_hostnames"),
    );

    let config: LabConfig = builder
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")?;

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("hijacklab-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "attach_command = []\nshell = [\"/bin/sh\", \"-c\"]\n\n[probe]\ntimeout_secs = 9\n\n[topology]\ntarget_address = \"10.0.0.1\""
        )
        .unwrap();

        let config = load(path.to_str()).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert!(config.attach_command.is_empty());
        assert_eq!(config.shell, vec!["/bin/sh", "-c"]);
        assert_eq!(config.probe.timeout_secs, 9);
        assert_eq!(config.topology.target_address, "10.0.0.1");
        // untouched sections keep their defaults
        assert_eq!(config.probe.vty_port, 2605);
        assert_eq!(config.topology.attacker_router.as_str(), "R6");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(load(Some("/nonexistent/hijacklab.toml")).is_err());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let path = std::env::temp_dir().join(format!(
            "hijacklab-invalid-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[probe]\ntimeout_secs = 0\n").unwrap();

        let result = load(path.to_str());
        std::fs::remove_file(&path).unwrap();

        assert!(result.is_err());
    }
}
