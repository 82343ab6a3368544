//! First-run setup data
//!
//! The setup file is a JSON object. Until the user completes setup, values
//! come from the registered auto-configurators.

use crate::error::Result;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// A named function producing the initial value of one setup key
#[derive(Debug, Clone, Copy)]
pub struct AutoConfigurator {
    pub name: &'static str,
    pub configure: fn() -> anyhow::Result<Value>,
}

impl AutoConfigurator {
    pub const fn new(name: &'static str, configure: fn() -> anyhow::Result<Value>) -> Self {
        Self { name, configure }
    }
}

fn detect_language() -> anyhow::Result<Value> {
    let lang = std::env::var("LANG").unwrap_or_default();
    let code = lang
        .split(['_', '.', '-'])
        .next()
        .filter(|c| c.len() == 2 && c.chars().all(|ch| ch.is_ascii_alphabetic()))
        .map(|c| c.to_lowercase())
        .unwrap_or_else(|| "en".to_string());
    Ok(Value::String(code))
}

/// Configurators used by the CLI
pub fn default_configurators() -> Vec<AutoConfigurator> {
    vec![AutoConfigurator::new("language", detect_language)]
}

#[derive(Debug, Clone)]
pub struct Setup {
    path: PathBuf,
    data: Map<String, Value>,
    completed: bool,
}

impl Setup {
    /// Load the setup file, auto-configuring when it is missing or unreadable
    pub fn open(path: impl Into<PathBuf>, configurators: &[AutoConfigurator]) -> Result<Self> {
        let path = path.into();
        let loaded = Self::load(&path)?;
        let completed = loaded
            .as_ref()
            .is_some_and(|data| data.contains_key("completed"));

        let data = match loaded {
            Some(data) => data,
            None => Self::auto_configure(configurators)?,
        };

        Ok(Self {
            path,
            data,
            completed,
        })
    }

    fn load(path: &Path) -> Result<Option<Map<String, Value>>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Object(data)) => Ok(Some(data)),
            Ok(_) => {
                error!("Setup file loading failed: {} is not a JSON object", path.display());
                Ok(None)
            }
            Err(e) => {
                error!("Setup file loading failed: {}", e);
                Ok(None)
            }
        }
    }

    fn auto_configure(configurators: &[AutoConfigurator]) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for configurator in configurators {
            debug!(key = configurator.name, "Auto-configuring setup value");
            data.insert(configurator.name.to_string(), (configurator.configure)()?);
        }
        Ok(data)
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Merge `new_data` into the setup data and write the file
    pub fn append(&mut self, new_data: Map<String, Value>) -> Result<()> {
        self.data.extend(new_data);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string(&self.data)?)?;
        Ok(())
    }

    /// Write `new_data` and mark setup as completed
    pub fn save(&mut self, mut new_data: Map<String, Value>) -> Result<()> {
        new_data.insert("completed".to_string(), Value::Bool(true));
        self.append(new_data)?;
        self.completed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;
    use tempfile::TempDir;

    fn fixed_timezone() -> anyhow::Result<Value> {
        Ok(json!("UTC"))
    }

    fn broken() -> anyhow::Result<Value> {
        anyhow::bail!("locale unavailable")
    }

    const CONFIGURATORS: &[AutoConfigurator] = &[AutoConfigurator::new("timezone", fixed_timezone)];

    #[test]
    fn test_missing_file_auto_configures() {
        let tmp = TempDir::new().unwrap();
        let setup = Setup::open(tmp.path().join("setup.json"), CONFIGURATORS).unwrap();
        assert!(!setup.is_completed());
        assert_eq!(setup.get("timezone"), Some(&json!("UTC")));
    }

    #[test]
    fn test_invalid_file_auto_configures() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("setup.json");
        std::fs::write(&path, "{broken").unwrap();
        let setup = Setup::open(&path, CONFIGURATORS).unwrap();
        assert!(!setup.is_completed());
        assert_eq!(setup.get("timezone"), Some(&json!("UTC")));
    }

    #[test]
    fn test_save_marks_completed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("setup.json");
        let mut setup = Setup::open(&path, CONFIGURATORS).unwrap();

        let mut data = Map::new();
        data.insert("language".to_string(), json!("fr"));
        setup.save(data).unwrap();
        assert!(setup.is_completed());

        let reopened = Setup::open(&path, &[]).unwrap();
        assert!(reopened.is_completed());
        assert_eq!(reopened.get("language"), Some(&json!("fr")));
        assert_eq!(reopened.get("timezone"), Some(&json!("UTC")));
    }

    #[test]
    fn test_append_keeps_incomplete() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("setup.json");
        let mut setup = Setup::open(&path, &[]).unwrap();
        let mut data = Map::new();
        data.insert("step".to_string(), json!(1));
        setup.append(data).unwrap();

        let reopened = Setup::open(&path, CONFIGURATORS).unwrap();
        assert!(!reopened.is_completed());
        assert_eq!(reopened.get("step"), Some(&json!(1)));
        assert!(reopened.get("timezone").is_none());
    }

    #[test]
    fn test_configurator_failure_propagates() {
        let tmp = TempDir::new().unwrap();
        let configurators = [AutoConfigurator::new("broken", broken)];
        let err = Setup::open(tmp.path().join("setup.json"), &configurators).unwrap_err();
        assert!(matches!(err, Error::Other(msg) if msg.contains("locale unavailable")));
    }

    #[test]
    fn test_default_configurators() {
        let names: Vec<&str> = default_configurators().iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["language"]);
        assert!((default_configurators()[0].configure)().unwrap().is_string());
    }
}
