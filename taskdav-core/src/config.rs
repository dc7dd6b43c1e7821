//! Bridge configuration.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::{DavError, DavResult};

const DEFAULT_BASE_PATH: &str = "/dav/";
const DEFAULT_PAGE_SIZE: usize = 50;
const DEFAULT_MAX_ITEMS: usize = 1000;
const ENV_PREFIX: &str = "TASKDAV";

fn default_base_path() -> String {
    DEFAULT_BASE_PATH.to_string()
}

fn default_collections_segment() -> String {
    "projects".to_string()
}

fn default_principals_segment() -> String {
    "principals".to_string()
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

fn default_max_items() -> usize {
    DEFAULT_MAX_ITEMS
}

fn default_document_extension() -> String {
    "ics".to_string()
}

fn default_prodid() -> String {
    "-//taskdav//EN".to_string()
}

/// Configuration at ~/.config/taskdav/config.toml, overridable with
/// `TASKDAV_*` environment variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default = "default_base_path")]
    pub base_path: String,

    #[serde(default = "default_collections_segment")]
    pub collections_segment: String,

    #[serde(default = "default_principals_segment")]
    pub principals_segment: String,

    /// Projects per page when listing the calendar home.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound of tasks loaded into one calendar.
    #[serde(default = "default_max_items")]
    pub max_items_per_collection: usize,

    #[serde(default = "default_document_extension")]
    pub document_extension: String,

    #[serde(default = "default_prodid")]
    pub prodid: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            base_path: default_base_path(),
            collections_segment: default_collections_segment(),
            principals_segment: default_principals_segment(),
            page_size: default_page_size(),
            max_items_per_collection: default_max_items(),
            document_extension: default_document_extension(),
            prodid: default_prodid(),
        }
    }
}

impl BridgeConfig {
    pub fn config_path() -> DavResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| DavError::Config("Could not determine config directory".into()))?
            .join("taskdav");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from the default location. A missing file yields the defaults.
    pub fn load() -> DavResult<Self> {
        Self::load_from(Self::config_path()?)
    }

    /// Load from `path` (`~` is expanded), layering `TASKDAV_*` variables on top.
    pub fn load_from(path: impl AsRef<Path>) -> DavResult<Self> {
        let expanded = shellexpand::tilde(&path.as_ref().to_string_lossy()).into_owned();

        let config: BridgeConfig = Config::builder()
            .add_source(File::from(PathBuf::from(expanded)).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| DavError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| DavError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> DavResult<()> {
        if !self.base_path.starts_with('/') {
            return Err(DavError::Config(format!(
                "base_path must be absolute, got '{}'",
                self.base_path
            )));
        }
        if self.page_size == 0 || self.max_items_per_collection == 0 {
            return Err(DavError::Config(
                "page_size and max_items_per_collection must be positive".into(),
            ));
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> DavResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| DavError::Config(e.to_string()))?;

        std::fs::write(path, content)
            .map_err(|e| DavError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }

    /// Create a default config file with all options commented out.
    pub fn create_default_config(path: &Path) -> DavResult<()> {
        let contents = format!(
            "\
# taskdav configuration

# Where the CalDAV tree is mounted:
# base_path = \"{}\"

# Projects listed per page in the calendar home:
# page_size = {}

# Maximum tasks served in a single calendar:
# max_items_per_collection = {}
",
            DEFAULT_BASE_PATH, DEFAULT_PAGE_SIZE, DEFAULT_MAX_ITEMS
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DavError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| DavError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}
