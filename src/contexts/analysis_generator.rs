use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

use super::code_normalizer::CodeNormalizer;
use super::file_cache::FileCache;
use super::model_client::{GenerationSettings, ModelClient};
use super::response_parser::parse_response;
use super::retry_advisor::extract_retry_delay;
use crate::data::{AnalysisRequest, AnalysisResult, Cache, CodeBlock};

/// Template name looked up in the prompt registry for analysis code.
pub const ANALYSIS_TEMPLATE: &str = "analysis_code";

const DEFAULT_DATA_INFO: &str = "사용자가 제공한 data.csv 파일";

/// Errors raised while turning a template into a prompt
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("required placeholder '{0}' could not be resolved")]
    MissingMandatoryPlaceholder(String),
    #[error("invalid path '{0}' in placeholder")]
    InvalidPlaceholderPath(String),
    #[error("prompt template '{0}' not found in registry")]
    TemplateNotFound(String),
    #[error("prompt template is invalid: {0}")]
    InvalidTemplate(String),
}

/// Errors raised while loading model settings
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read model registry {path}: {message}")]
    Read { path: String, message: String },
    #[error("invalid model registry: {0}")]
    Invalid(String),
}

/// Errors raised by a generation call
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model service rate limit reached: {message}")]
    RateLimited { message: String },
    #[error("model service request failed: {0}")]
    Transport(String),
    #[error("GOOGLE_API_KEY is not set")]
    MissingApiKey,
    #[error(transparent)]
    Prompt(#[from] PromptError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl GenerationError {
    /// Seconds to wait before retrying, for rate-limit failures only.
    pub fn suggested_wait_secs(&self) -> Option<u64> {
        match self {
            GenerationError::RateLimited { message } => Some(extract_retry_delay(message)),
            _ => None,
        }
    }
}

/// Loads prompt templates by name
pub trait PromptRegistry {
    fn get_template(&self, name: &str) -> Result<String, PromptError>;
}

/// Resolves generation settings by purpose
pub trait ModelRegistry {
    fn get_settings(&self, purpose: &str) -> Result<GenerationSettings, RegistryError>;
}

/// Values visible to `{{input.*}}` placeholders
#[derive(Debug, Serialize)]
struct PromptInput<'a> {
    instruction: &'a str,
    language: &'a str,
    language_label: String,
    data_info: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_variable: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<String>,
}

impl<'a> PromptInput<'a> {
    fn from_request(request: &'a AnalysisRequest) -> Self {
        let data_info = request
            .data_profile
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_DATA_INFO)
            .to_string();

        Self {
            instruction: request.instruction.trim(),
            language: request.language.as_str(),
            language_label: request.language.as_str().to_uppercase(),
            data_info,
            target_variable: request.target_variable.as_deref(),
            context: history_context(&request.history),
        }
    }
}

/// Formats prior analyses as commented headers followed by their code.
pub fn history_context(history: &[CodeBlock]) -> Option<String> {
    if history.is_empty() {
        return None;
    }
    let entries: Vec<String> = history
        .iter()
        .enumerate()
        .map(|(i, block)| format!("# 이전 분석 {}: {}\n{}", i + 1, block.caption, block.code))
        .collect();
    Some(entries.join("\n\n"))
}

/// Renders the analysis prompt for a request without calling the model.
pub fn render_analysis_prompt<R: PromptRegistry>(
    prompts: &R,
    request: &AnalysisRequest,
) -> Result<String, PromptError> {
    let template = prompts.get_template(ANALYSIS_TEMPLATE)?;
    populate(&template, &PromptInput::from_request(request))
}

/// Generates analysis code: render prompt, consult cache, call the model,
/// extract and normalize the code.
pub struct AnalysisGenerator<R, C>
where
    R: PromptRegistry,
    C: ModelClient,
{
    prompts: R,
    client: C,
    normalizer: CodeNormalizer,
    /// Root of the response cache; `None` disables caching.
    cache_root: Option<PathBuf>,
}

impl<R, C> AnalysisGenerator<R, C>
where
    R: PromptRegistry,
    C: ModelClient,
{
    pub fn new(prompts: R, client: C) -> Self {
        Self {
            prompts,
            client,
            normalizer: CodeNormalizer::default(),
            cache_root: None,
        }
    }

    pub fn with_cache(mut self, root: Option<PathBuf>) -> Self {
        self.cache_root = Some(root.unwrap_or_else(|| PathBuf::from(super::file_cache::DEFAULT_CACHE_ROOT)));
        self
    }

    pub fn with_normalizer(mut self, normalizer: CodeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn render_prompt(&self, request: &AnalysisRequest) -> Result<String, PromptError> {
        render_analysis_prompt(&self.prompts, request)
    }

    pub fn generate(&self, request: &AnalysisRequest) -> Result<AnalysisResult, GenerationError> {
        let template = self.prompts.get_template(ANALYSIS_TEMPLATE)?;
        let prompt = populate(&template, &PromptInput::from_request(request))?;
        let model = self.client.model_name();

        let cache = self
            .cache_root
            .as_ref()
            .map(|root| FileCache::new(Some(root.clone()), hash_pair(&template, model)));
        let cache_key = hash_pair(&prompt, model);

        let raw = match cache.as_ref().and_then(|c| c.get(&cache_key)) {
            Some(hit) => hit,
            None => {
                let raw = self.client.generate(&prompt)?;
                if let Some(cache) = &cache {
                    cache.set(&cache_key, &raw);
                }
                raw
            }
        };

        Ok(self.build_result(raw, request))
    }

    /// Runs extraction and normalization on a response that is already at hand.
    pub fn build_result(&self, raw: String, request: &AnalysisRequest) -> AnalysisResult {
        let parsed = parse_response(&raw);
        let code = self.normalizer.normalize(&parsed.code, request.language);
        AnalysisResult {
            code,
            interpretation: parsed.interpretation,
            warnings: parsed.warnings,
            raw_response: raw,
            source: parsed.source,
        }
    }
}

/// Hex SHA-256 of `a:b`.
fn hash_pair(a: &str, b: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}", a, b).as_bytes());
    hex::encode(hasher.finalize())
}

/// Replaces placeholders in a template
///
/// Supports:
/// - Mandatory: {{input.prop_name}}
/// - Optional: {{input.prop_name?}}
/// - Nested: {{input.prop1.prop2}}
pub fn populate<T: Serialize>(template: &str, input: &T) -> Result<String, PromptError> {
    let input_json =
        serde_json::to_value(input).map_err(|e| PromptError::InvalidTemplate(e.to_string()))?;

    let mut result = template.to_string();
    let mut offset = 0;

    while let Some(found) = result[offset..].find("{{") {
        let start = offset + found;
        let Some(end_pos) = result[start..].find("}}") else {
            break;
        };
        let end = start + end_pos;

        let placeholder = result[start + 2..end].trim();
        let (path, is_optional) = match placeholder.strip_suffix('?') {
            Some(path) => (path, true),
            None => (placeholder, false),
        };

        match resolve_path(&input_json, path)? {
            Some(v) => {
                let replacement = match v {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    Value::Null => String::new(),
                    _ => serde_json::to_string(v)
                        .map_err(|e| PromptError::InvalidTemplate(e.to_string()))?,
                };
                result.replace_range(start..end + 2, &replacement);
                offset = start + replacement.len();
            }
            None if is_optional => {
                result.replace_range(start..end + 2, "");
                offset = start;
            }
            None => return Err(PromptError::MissingMandatoryPlaceholder(path.to_string())),
        }
    }

    Ok(result)
}

/// Resolves a dotted path such as `input.prop1.prop2`.
fn resolve_path<'a>(value: &'a Value, path: &str) -> Result<Option<&'a Value>, PromptError> {
    let mut parts = path.split('.');
    if parts.next() != Some("input") {
        return Err(PromptError::InvalidPlaceholderPath(path.to_string()));
    }

    let mut current = value;
    for part in parts {
        match current.get(part) {
            Some(v) => current = v,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ExtractionSource, TargetLanguage};
    use serde::Serialize;
    use std::cell::Cell;

    #[derive(Serialize)]
    struct TestInput {
        name: String,
        value: i32,
    }

    #[derive(Serialize)]
    struct Location {
        city: String,
    }

    #[derive(Serialize)]
    struct NestedInput {
        name: String,
        location: Location,
    }

    struct StaticPrompts(&'static str);

    impl PromptRegistry for StaticPrompts {
        fn get_template(&self, name: &str) -> Result<String, PromptError> {
            if name == ANALYSIS_TEMPLATE {
                Ok(self.0.to_string())
            } else {
                Err(PromptError::TemplateNotFound(name.to_string()))
            }
        }
    }

    struct ScriptedClient {
        response: Result<&'static str, &'static str>,
        calls: Cell<usize>,
    }

    impl ScriptedClient {
        fn ok(response: &'static str) -> Self {
            Self { response: Ok(response), calls: Cell::new(0) }
        }

        fn rate_limited(message: &'static str) -> Self {
            Self { response: Err(message), calls: Cell::new(0) }
        }
    }

    impl ModelClient for ScriptedClient {
        fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            self.calls.set(self.calls.get() + 1);
            match self.response {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(GenerationError::RateLimited { message: message.to_string() }),
            }
        }

        fn model_name(&self) -> &str {
            "test-model"
        }
    }

    const TEMPLATE: &str = "{{input.context?}}\n요청: {{input.instruction}}\n언어: {{input.language_label}}\n데이터: {{input.data_info}}\n대상: {{input.target_variable?}}";

    const RESPONSE: &str = "1. **코드:**\n```python\n1. 임포트\nimport pandas as pd import numpy as np\ndf = pd.read_csv('data.csv')\n```\n\n2. **해석:**\n데이터를 불러옵니다.\n\n3. **주의사항:**\n결측치를 확인하세요.";

    fn block(caption: &str, code: &str) -> CodeBlock {
        CodeBlock {
            language: TargetLanguage::Python,
            code: code.to_string(),
            caption: caption.to_string(),
            interpretation: String::new(),
            timestamp: "2025-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn test_populate_mandatory() {
        let input = TestInput { name: "Alice".to_string(), value: 100 };
        let result = populate("Hello {{input.name}}, your value is {{input.value}}!", &input);
        assert_eq!(result.unwrap(), "Hello Alice, your value is 100!");
    }

    #[test]
    fn test_populate_optional_missing() {
        let input = TestInput { name: "Bob".to_string(), value: 1 };
        assert_eq!(populate("Age: {{input.age?}}", &input).unwrap(), "Age: ");
    }

    #[test]
    fn test_populate_mandatory_missing() {
        let input = TestInput { name: "Dave".to_string(), value: 400 };
        match populate("Missing: {{input.missing_field}}", &input) {
            Err(PromptError::MissingMandatoryPlaceholder(field)) => {
                assert_eq!(field, "input.missing_field");
            }
            other => panic!("Expected MissingMandatoryPlaceholder, got {:?}", other),
        }
    }

    #[test]
    fn test_populate_invalid_path() {
        let input = TestInput { name: "Eve".to_string(), value: 500 };
        match populate("Invalid: {{output.field}}", &input) {
            Err(PromptError::InvalidPlaceholderPath(path)) => assert_eq!(path, "output.field"),
            other => panic!("Expected InvalidPlaceholderPath, got {:?}", other),
        }
    }

    #[test]
    fn test_populate_nested() {
        let input = NestedInput {
            name: "Frank".to_string(),
            location: Location { city: "Paris".to_string() },
        };
        let result = populate("{{input.name}} lives in {{input.location.city}}", &input);
        assert_eq!(result.unwrap(), "Frank lives in Paris");
    }

    #[test]
    fn test_history_context_numbers_entries() {
        let history = vec![block("첫 분석", "import pandas as pd"), block("둘째", "df.head()")];
        assert_eq!(
            history_context(&history).unwrap(),
            "# 이전 분석 1: 첫 분석\nimport pandas as pd\n\n# 이전 분석 2: 둘째\ndf.head()"
        );
        assert_eq!(history_context(&[]), None);
    }

    #[test]
    fn test_render_prompt_defaults_and_optionals() {
        let generator = AnalysisGenerator::new(StaticPrompts(TEMPLATE), ScriptedClient::ok(""));
        let request = AnalysisRequest::new("그룹 비교", TargetLanguage::R);
        let prompt = generator.render_prompt(&request).unwrap();
        assert_eq!(
            prompt,
            "\n요청: 그룹 비교\n언어: R\n데이터: 사용자가 제공한 data.csv 파일\n대상: "
        );
    }

    #[test]
    fn test_render_prompt_carries_profile_target_and_window() {
        let generator = AnalysisGenerator::new(StaticPrompts(TEMPLATE), ScriptedClient::ok(""));
        let history: Vec<CodeBlock> = (1..=5).map(|i| block(&format!("c{}", i), "x = 1")).collect();
        let request = AnalysisRequest::new("t-test", TargetLanguage::Python)
            .with_data_profile("rows: 10")
            .with_target_variable("ct_value")
            .with_history(&history);

        let prompt = generator.render_prompt(&request).unwrap();
        assert!(prompt.starts_with("# 이전 분석 1: c3\n"));
        assert!(!prompt.contains("c2"));
        assert!(prompt.contains("데이터: rows: 10"));
        assert!(prompt.ends_with("대상: ct_value"));
    }

    #[test]
    fn test_generate_extracts_and_normalizes() {
        let generator = AnalysisGenerator::new(StaticPrompts(TEMPLATE), ScriptedClient::ok(RESPONSE));
        let request = AnalysisRequest::new("데이터 로드", TargetLanguage::Python);
        let result = generator.generate(&request).unwrap();

        assert_eq!(
            result.code,
            "# 1. 임포트\nimport pandas as pd\nimport numpy as np\ndf = pd.read_csv('data.csv')"
        );
        assert_eq!(result.interpretation, "데이터를 불러옵니다.");
        assert_eq!(result.warnings, "결측치를 확인하세요.");
        assert_eq!(result.source, ExtractionSource::FencedBlock);
        assert_eq!(result.raw_response, RESPONSE);
    }

    #[test]
    fn test_generate_uses_cache_on_second_call() {
        let dir = tempfile::tempdir().unwrap();
        let generator = AnalysisGenerator::new(StaticPrompts(TEMPLATE), ScriptedClient::ok(RESPONSE))
            .with_cache(Some(dir.path().to_path_buf()));
        let request = AnalysisRequest::new("데이터 로드", TargetLanguage::Python);

        let first = generator.generate(&request).unwrap();
        let second = generator.generate(&request).unwrap();
        assert_eq!(first, second);
        assert_eq!(generator.client.calls.get(), 1);
    }

    #[test]
    fn test_generate_without_cache_always_calls_model() {
        let generator = AnalysisGenerator::new(StaticPrompts(TEMPLATE), ScriptedClient::ok(RESPONSE));
        let request = AnalysisRequest::new("데이터 로드", TargetLanguage::Python);
        generator.generate(&request).unwrap();
        generator.generate(&request).unwrap();
        assert_eq!(generator.client.calls.get(), 2);
    }

    #[test]
    fn test_rate_limit_suggests_wait() {
        let generator = AnalysisGenerator::new(
            StaticPrompts(TEMPLATE),
            ScriptedClient::rate_limited("429 quota exceeded, retry in 19.94s"),
        );
        let request = AnalysisRequest::new("x", TargetLanguage::Python);
        let err = generator.generate(&request).unwrap_err();
        assert_eq!(err.suggested_wait_secs(), Some(20));
        assert_eq!(GenerationError::MissingApiKey.suggested_wait_secs(), None);
    }

    #[test]
    fn test_missing_template_is_a_prompt_error() {
        struct NoPrompts;
        impl PromptRegistry for NoPrompts {
            fn get_template(&self, name: &str) -> Result<String, PromptError> {
                Err(PromptError::TemplateNotFound(name.to_string()))
            }
        }
        let generator = AnalysisGenerator::new(NoPrompts, ScriptedClient::ok(RESPONSE));
        let err = generator
            .generate(&AnalysisRequest::new("x", TargetLanguage::Python))
            .unwrap_err();
        assert!(matches!(err, GenerationError::Prompt(PromptError::TemplateNotFound(_))));
    }
}
