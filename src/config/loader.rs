use crate::config::schema::{PanelConfig, PanelConfigLayer};
use crate::error::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PanelConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        let config = Self::load_with_inheritance(path, &mut visited)?.resolve();
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to validated defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<PanelConfig> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = PanelConfig::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    fn load_with_inheritance(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<PanelConfigLayer> {
        let path = fs::canonicalize(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        if !visited.insert(path.clone()) {
            return Err(Error::Config(format!(
                "Circular inheritance detected involving {}",
                path.display()
            )));
        }

        let layer = Self::load_file(&path)?;

        match layer.extends.clone() {
            Some(parent_path_str) => {
                let parent_path = path
                    .parent()
                    .ok_or_else(|| {
                        Error::Config(format!(
                            "Cannot determine parent directory for {}",
                            path.display()
                        ))
                    })?
                    .join(parent_path_str);

                let parent = Self::load_with_inheritance(&parent_path, visited)?;
                Ok(layer.over(parent))
            }
            None => Ok(layer),
        }
    }

    fn load_file(path: &Path) -> Result<PanelConfigLayer> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&content)?),
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }
}
