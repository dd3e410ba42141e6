mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./distiller.toml",
        "./config.toml",
        "~/.config/periodical-distiller/config.toml",
        "/etc/periodical-distiller/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.processing.poll_interval_secs == 0 {
        anyhow::bail!("processing.poll_interval_secs cannot be 0");
    }

    for (stage, command) in config.stages.iter() {
        if let Some(command) = command {
            if command.command.trim().is_empty() {
                anyhow::bail!("Stage '{}' has an empty command", stage);
            }
        }
    }

    if config.workspace.sip_output.starts_with(&config.workspace.root) {
        anyhow::bail!(
            "workspace.sip_output {:?} must not live inside the bucket root {:?}",
            config.workspace.sip_output,
            config.workspace.root
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_empty_file_is_default() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.processing.poll_interval_secs, 5);
        assert_eq!(config.workspace.root, PathBuf::from("./workspace/pipeline"));
        assert!(config.stages.html.is_none());
        validate_config(&config).unwrap();
    }

    #[test]
    fn test_parse_stage_commands() {
        let config: Config = toml::from_str(
            r#"
            [workspace]
            root = "/srv/distiller/buckets"
            sip_output = "/srv/distiller/sips"

            [processing]
            poll_interval_secs = 2

            [stages.html]
            command = "render-html"
            args = ["{pip_path}", "{sip_path}"]

            [stages.mets]
            command = "compile-mets"
            args = ["{sip_path}"]
            env = { VERIDIAN_PROFILE = "dpul" }
            "#,
        )
        .unwrap();

        validate_config(&config).unwrap();
        let html = config.stages.get("html").unwrap();
        assert_eq!(html.command, "render-html");
        assert_eq!(html.args, vec!["{pip_path}", "{sip_path}"]);
        assert_eq!(
            config.stages.get("mets").unwrap().env["VERIDIAN_PROFILE"],
            "dpul"
        );
        assert!(config.stages.get("pdf").is_none());
        assert!(config.stages.get("unknown").is_none());
    }

    #[test]
    fn test_rejects_zero_poll_interval() {
        let mut config = Config::default();
        config.processing.poll_interval_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_rejects_empty_command() {
        let config: Config = toml::from_str("[stages.pdf]\ncommand = \"  \"\n").unwrap();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("pdf"));
    }

    #[test]
    fn test_rejects_sips_inside_buckets() {
        let mut config = Config::default();
        config.workspace.root = PathBuf::from("/srv/work");
        config.workspace.sip_output = PathBuf::from("/srv/work/sips");
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_config_reports_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("distiller.toml");
        std::fs::write(&path, "[processing\n").unwrap();
        let err = load_config(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }

    #[test]
    #[serial]
    fn test_default_lookup_uses_working_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("distiller.toml"),
            "[processing]\npoll_interval_secs = 9\n",
        )
        .unwrap();

        let previous = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();
        let loaded = load_config_or_default(None);
        std::env::set_current_dir(previous).unwrap();

        assert_eq!(loaded.unwrap().processing.poll_interval_secs, 9);
    }
}
