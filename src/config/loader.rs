//! Reads a plugin section out of the agent's INI config file.
//!
//! Values are taken verbatim: no escape sequences, no quote stripping, so
//! credentials with `\`, `"`, `#` or `;` reach the connection unchanged.

use std::path::Path;

use ini::{Ini, ParseOption};
use tracing::debug;

use super::RawSection;
use crate::error::{PluginError, Result};

/// Section name the agent uses for this plugin.
pub const DEFAULT_SECTION: &str = "PostgreSQL";

const RAW_VALUES: ParseOption = ParseOption {
    enabled_quote: false,
    enabled_escape: false,
};

/// Loads `section` from the INI file at `path`.
///
/// Returns `Ok(None)` when the file parses but has no such section; validation
/// turns that into a missing-config error. Section and key names are matched
/// case-insensitively.
pub fn load_section(path: &Path, section: &str) -> Result<Option<RawSection>> {
    let file = Ini::load_from_file_opt(path, RAW_VALUES)
        .map_err(|e| PluginError::Config(format!("{}: {}", path.display(), e)))?;

    let Some((_, properties)) = file
        .iter()
        .find(|(name, _)| name.is_some_and(|n| n.eq_ignore_ascii_case(section)))
    else {
        debug!(path = %path.display(), section, "config section not found");
        return Ok(None);
    };

    Ok(Some(
        properties
            .iter()
            .map(|(key, value)| (key.to_ascii_lowercase(), value.to_string()))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_plugin_section() {
        let file = write_config(
            "[Main]\n\
             agent_key = abc\n\
             \n\
             [PostgreSQL]\n\
             postgres_database = app\n\
             postgres_user = monitor\n\
             postgres_pass = secret\n\
             postgres_port = 6432\n",
        );

        let section = load_section(file.path(), DEFAULT_SECTION)
            .unwrap()
            .unwrap();
        assert_eq!(section.get("postgres_database").map(String::as_str), Some("app"));
        assert_eq!(section.get("postgres_user").map(String::as_str), Some("monitor"));
        assert_eq!(section.get("postgres_pass").map(String::as_str), Some("secret"));
        assert_eq!(section.get("postgres_port").map(String::as_str), Some("6432"));
        assert!(!section.contains_key("agent_key"));
    }

    #[test]
    fn password_with_special_characters_is_kept_verbatim() {
        let file = write_config(
            "[PostgreSQL]\n\
             postgres_pass = a\\b#c;d\"e\n\
             postgres_user = dom\\nuser\n",
        );

        let section = load_section(file.path(), DEFAULT_SECTION)
            .unwrap()
            .unwrap();
        assert_eq!(
            section.get("postgres_pass").map(String::as_str),
            Some("a\\b#c;d\"e")
        );
        assert_eq!(
            section.get("postgres_user").map(String::as_str),
            Some("dom\\nuser")
        );
    }

    #[test]
    fn section_name_is_case_insensitive() {
        let file = write_config("[postgresql]\npostgres_database = app\n");
        let section = load_section(file.path(), "PostgreSQL").unwrap().unwrap();
        assert_eq!(section.get("postgres_database").map(String::as_str), Some("app"));
    }

    #[test]
    fn missing_section_is_none() {
        let file = write_config("[Main]\nagent_key = abc\n");
        assert_eq!(load_section(file.path(), DEFAULT_SECTION).unwrap(), None);
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ini");
        assert!(matches!(
            load_section(&path, DEFAULT_SECTION),
            Err(PluginError::Config(_))
        ));
    }
}
