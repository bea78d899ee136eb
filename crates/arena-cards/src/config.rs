//! Run configuration: loaded once at startup from a JSON file and treated
//! as read-only for the rest of the run.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::prelude::*;

/// Environment variable consulted when the config file carries no credential.
const TOKEN_ENV_VAR: &str = "ARENA_PERSONAL_TOKEN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory every generated artifact lands in.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Raw-fetch boundary file, under `output_dir`.
    #[serde(default = "default_raw_data_filename")]
    pub raw_data_filename: String,

    /// Processed-blocks boundary file, under `output_dir`.
    #[serde(default = "default_processed_data_filename")]
    pub processed_data_filename: String,

    /// Images subdirectory under `output_dir`.
    #[serde(default = "default_images_dir")]
    pub images_dir: String,

    /// Rendered typst document, under `output_dir`.
    #[serde(default = "default_output_typst_file")]
    pub output_typst_file: String,

    /// are.na personal access token. May instead come from the environment.
    #[serde(default)]
    pub arena_personal_token: Option<String>,

    /// The user whose channels are fetched.
    pub arena_user_slug: String,

    /// Minimum update timestamp (RFC 3339); older blocks are dropped during
    /// processing.
    #[serde(default)]
    pub min_updated_date: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_raw_data_filename() -> String {
    "arena_raw.json".to_string()
}

fn default_processed_data_filename() -> String {
    "arena_blocks.json".to_string()
}

fn default_images_dir() -> String {
    "images".to_string()
}

fn default_output_typst_file() -> String {
    "cards.typ".to_string()
}

impl Config {
    /// Load the configuration file. A missing or malformed file is fatal.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|_| {
            eyre!(
                "Configuration file {} not found. Copy config_EXAMPLE.json to config.json and fill in your are.na details.",
                path.display()
            )
        })?;
        serde_json::from_str(&contents)
            .map_err(|e| eyre!("Failed to parse {}: {e}", path.display()))
    }

    /// The API credential: the config file value wins, then the environment.
    /// Having neither is fatal.
    pub fn token(&self) -> Result<String> {
        if let Some(token) = self.arena_personal_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }
        std::env::var(TOKEN_ENV_VAR).map_err(|_| {
            eyre!(
                "No are.na credential: set arena_personal_token in the config file or {TOKEN_ENV_VAR} in the environment"
            )
        })
    }

    pub fn raw_data_path(&self) -> PathBuf {
        self.output_dir.join(&self.raw_data_filename)
    }

    pub fn processed_data_path(&self) -> PathBuf {
        self.output_dir.join(&self.processed_data_filename)
    }

    pub fn images_dir_path(&self) -> PathBuf {
        self.output_dir.join(&self.images_dir)
    }

    pub fn output_typst_path(&self) -> PathBuf {
        self.output_dir.join(&self.output_typst_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"arena_user_slug": "casey"}"#).unwrap();

        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.raw_data_filename, "arena_raw.json");
        assert_eq!(config.processed_data_filename, "arena_blocks.json");
        assert_eq!(config.images_dir, "images");
        assert_eq!(config.output_typst_file, "cards.typ");
        assert_eq!(config.arena_personal_token, None);
        assert_eq!(config.min_updated_date, None);
    }

    #[test]
    fn test_full_config_overrides_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "output_dir": "out",
                "raw_data_filename": "raw.json",
                "processed_data_filename": "blocks.json",
                "images_dir": "img",
                "output_typst_file": "deck.typ",
                "arena_personal_token": "secret",
                "arena_user_slug": "casey",
                "min_updated_date": "2025-12-20T00:00:00.000Z"
            }"#,
        )
        .unwrap();

        assert_eq!(config.raw_data_path(), PathBuf::from("out/raw.json"));
        assert_eq!(
            config.processed_data_path(),
            PathBuf::from("out/blocks.json")
        );
        assert_eq!(config.images_dir_path(), PathBuf::from("out/img"));
        assert_eq!(config.output_typst_path(), PathBuf::from("out/deck.typ"));
        assert_eq!(config.token().unwrap(), "secret");
    }

    #[test]
    fn test_config_without_user_slug_fails() {
        let result = serde_json::from_str::<Config>(r#"{}"#);
        assert!(result.is_err());
    }
}
