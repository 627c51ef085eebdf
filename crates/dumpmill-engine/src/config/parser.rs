//! Config YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::config::types::DumpConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Expand every `${VAR_NAME}` occurrence from the process environment.
///
/// All unset variables are collected and reported together, so an operator
/// fixes the config in one pass instead of one error at a time.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing = Vec::new();
    let mut result = input.to_string();

    for cap in ENV_VAR_RE.captures_iter(input) {
        let name = &cap[1];
        if let Ok(value) = std::env::var(name) {
            result = result.replace(&cap[0], &value);
        } else {
            missing.push(name.to_string());
        }
    }

    if missing.is_empty() {
        Ok(result)
    } else {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "))
    }
}

/// Parse config YAML held in memory, expanding `${VAR}` references first.
///
/// # Errors
///
/// Returns an error if a referenced variable is unset or the YAML does not
/// deserialize into [`DumpConfig`].
pub fn parse_config_str(yaml_str: &str) -> Result<DumpConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&substituted).context("Failed to parse dump config YAML")
}

/// Read and parse the config file the CLI was pointed at.
///
/// # Errors
///
/// Returns an error if the file is unreadable or its contents do not parse.
pub fn load_config(path: &Path) -> Result<DumpConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_substitution() {
        std::env::set_var("DM_TEST_ROOT", "/srv/dumps");
        let input = "public_root: ${DM_TEST_ROOT}/public\nprivate_root: /srv/private";
        let result = substitute_env_vars(input).unwrap();
        assert!(result.contains("/srv/dumps/public"));
        assert!(!result.contains("${DM_TEST_ROOT}"));
        std::env::remove_var("DM_TEST_ROOT");
    }

    #[test]
    fn test_missing_env_var_errors() {
        let input = "public_root: ${DM_DEFINITELY_NOT_SET_12345}";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("DM_DEFINITELY_NOT_SET_12345"));
    }

    #[test]
    fn test_multiple_missing_env_vars_all_reported() {
        let input = "${DM_MISSING_X} and ${DM_MISSING_Y}";
        let result = substitute_env_vars(input);
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("DM_MISSING_X"));
        assert!(err_msg.contains("DM_MISSING_Y"));
    }

    #[test]
    fn test_parse_config_from_string() {
        let yaml = r"
public_root: /srv/dumps/public
private_root: /srv/dumps/private
checkpoints: true
worker_count: 4
parts:
  enabled: true
  page_bands: [50000, 100000, 100000]
database:
  server: db1042
  tables: [site_stats, category]
";
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.public_root.to_str(), Some("/srv/dumps/public"));
        assert!(config.checkpoints);
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.parts.page_bands.len(), 3);
        assert_eq!(config.database.tables, vec!["site_stats", "category"]);
    }

    #[test]
    fn test_defaults_fill_omitted_fields() {
        let yaml = "public_root: /pub\nprivate_root: /priv";
        let config = parse_config_str(yaml).unwrap();
        assert_eq!(config.worker_count, 1);
        assert_eq!(config.prefetch_min_bytes, 70_000);
        assert_eq!(config.run_marker_var, "DUMPMILL_RUN");
        assert_eq!(config.maintenance_file, "maintenance.txt");
        assert!(!config.parts.enabled);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let yaml = "public_root: /pub\nprivate_root: /priv\nbogus: 1";
        assert!(parse_config_str(yaml).is_err());
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/dumpmill.yaml"));
        assert!(result.is_err());
        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("Failed to read config file"));
    }
}
