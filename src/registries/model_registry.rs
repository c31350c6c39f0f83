use crate::contexts::{GenerationSettings, ModelRegistry, RegistryError};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use yaml_rust::Yaml;

/// File-based implementation of ModelRegistry
/// Loads purpose-to-model mappings from a YAML file
#[derive(Clone)]
pub struct FileModelRegistry {
    registry_path: PathBuf,
    defaults: GenerationSettings,
}

impl FileModelRegistry {
    /// # Arguments
    /// * `registry_path` - Optional path to registry file (defaults to "prompts/model_registry.yml")
    /// * `defaults` - Settings used for purposes the file does not mention
    pub fn new(registry_path: Option<PathBuf>, defaults: Option<GenerationSettings>) -> Self {
        Self {
            registry_path: registry_path
                .unwrap_or_else(|| PathBuf::from("prompts/model_registry.yml")),
            defaults: defaults.unwrap_or_default(),
        }
    }

    fn load_registry(&self) -> Result<HashMap<String, GenerationSettings>, RegistryError> {
        if !self.registry_path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.registry_path).map_err(|e| RegistryError::Read {
            path: self.registry_path.display().to_string(),
            message: e.to_string(),
        })?;

        parse_registry(&content, &self.defaults)
    }
}

impl ModelRegistry for FileModelRegistry {
    fn get_settings(&self, purpose: &str) -> Result<GenerationSettings, RegistryError> {
        let mut registry = self.load_registry()?;
        Ok(registry.remove(purpose).unwrap_or_else(|| self.defaults.clone()))
    }
}

/// Parses the YAML registry file
/// Supports both the short format (model name) and the full format (object
/// with model and sampling parameters); missing fields take the defaults.
fn parse_registry(
    yaml_content: &str,
    defaults: &GenerationSettings,
) -> Result<HashMap<String, GenerationSettings>, RegistryError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| RegistryError::Invalid(format!("invalid registry YAML: {}", e)))?;

    let mut registry = HashMap::new();
    let Some(hash) = docs.first().and_then(Yaml::as_hash) else {
        return Ok(registry);
    };

    for (key, value) in hash {
        let Some(purpose) = key.as_str() else {
            continue;
        };
        let settings = match value {
            Yaml::String(model) => GenerationSettings {
                model: model.clone(),
                ..defaults.clone()
            },
            Yaml::Hash(_) => GenerationSettings {
                model: value["model"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| defaults.model.clone()),
                temperature: as_float(&value["temperature"]).unwrap_or(defaults.temperature),
                top_p: as_float(&value["top_p"]).unwrap_or(defaults.top_p),
                top_k: as_count(&value["top_k"], purpose, "top_k")?.unwrap_or(defaults.top_k),
                max_output_tokens: as_count(&value["max_output_tokens"], purpose, "max_output_tokens")?
                    .unwrap_or(defaults.max_output_tokens),
            },
            _ => defaults.clone(),
        };
        registry.insert(purpose.to_string(), settings);
    }

    Ok(registry)
}

/// YAML writes `1` and `1.0` differently; both are accepted.
fn as_float(value: &Yaml) -> Option<f64> {
    value.as_f64().or_else(|| value.as_i64().map(|i| i as f64))
}

fn as_count(value: &Yaml, purpose: &str, field: &str) -> Result<Option<u32>, RegistryError> {
    match value.as_i64() {
        None => Ok(None),
        Some(n) => u32::try_from(n).map(Some).map_err(|_| {
            RegistryError::Invalid(format!("{}.{} must be a non-negative integer, got {}", purpose, field, n))
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_short_format() {
        let yaml = "analysis_code: gemini-2.0-flash\n";
        let registry = parse_registry(yaml, &GenerationSettings::default()).unwrap();
        let settings = &registry["analysis_code"];
        assert_eq!(settings.model, "gemini-2.0-flash");
        assert_eq!(settings.top_k, 40);
    }

    #[test]
    fn test_parse_registry_full_format() {
        let yaml = r#"
analysis_code:
  model: gemini-2.5-pro
  temperature: 0
  top_p: 0.8
  max_output_tokens: 4096
"#;
        let registry = parse_registry(yaml, &GenerationSettings::default()).unwrap();
        let settings = &registry["analysis_code"];
        assert_eq!(settings.model, "gemini-2.5-pro");
        assert_eq!(settings.temperature, 0.0);
        assert_eq!(settings.top_p, 0.8);
        assert_eq!(settings.top_k, 40);
        assert_eq!(settings.max_output_tokens, 4096);
    }

    #[test]
    fn test_negative_counts_are_rejected() {
        let yaml = "analysis_code:\n  top_k: -1\n";
        assert!(matches!(
            parse_registry(yaml, &GenerationSettings::default()),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn test_parse_empty_registry() {
        assert!(parse_registry("", &GenerationSettings::default()).unwrap().is_empty());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FileModelRegistry::new(Some(dir.path().join("none.yml")), None);
        assert_eq!(registry.get_settings("analysis_code").unwrap(), GenerationSettings::default());
    }

    #[test]
    fn test_unknown_purpose_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model_registry.yml");
        fs::write(&path, "vision: gemini-2.5-flash\n").unwrap();
        let registry = FileModelRegistry::new(Some(path), None);
        assert_eq!(registry.get_settings("analysis_code").unwrap().model, "gemini-2.5-flash");
    }
}
