use crate::contexts::{PromptError, PromptRegistry, ANALYSIS_TEMPLATE};
use std::fs;
use std::path::PathBuf;

/// Template used for `analysis_code` when `prompts/analysis_code.yml` is absent.
pub const DEFAULT_ANALYSIS_TEMPLATE: &str = r#"당신은 생명과학 실험 데이터 분석 전문가입니다.
사용자의 자연어 설명을 **실행 가능한** R 또는 Python 코드로 변환합니다.

**핵심 규칙:**
1. 코드는 Quarto 문서(.qmd)에서 실행되므로 반드시 유효한 구문만 포함
2. 통계 검정 시 반드시 가정 검증 단계 포함 (정규성, 등분산성)
3. 시각화는 publication-quality로 (가독성 높은 폰트와 레이블)
4. 모든 코드는 반드시 주석(#)을 포함하여 줄바꿈을 지키며 작성
5. 데이터 파일명은 'data.csv'로 가정
6. 다른 설명 텍스트는 절대 코드 블록 안에 넣지 말 것

**이전 분석 내역:**
{{input.context?}}

**사용자 요청:**
{{input.instruction}}

**분석 언어:** {{input.language_label}}

**데이터 정보:** {{input.data_info}}

**분석 대상 변수:** {{input.target_variable?}}

다음 형식으로 응답하세요:

1. **코드:**
```{{input.language}}
# 여기에 완전한 코드
```

2. **해석:**
생성된 분석의 의미와 결과 해석 방법

3. **주의사항:**
실험자가 알아야 할 통계적 가정이나 제약사항
"#;

/// File-based implementation of PromptRegistry
/// Loads prompt templates from YAML files in the prompts/ directory
#[derive(Clone)]
pub struct FilePromptRegistry {
    prompts_dir: PathBuf,
}

impl FilePromptRegistry {
    /// # Arguments
    /// * `prompts_dir` - Optional path to the prompts directory (defaults to "prompts")
    pub fn new(prompts_dir: Option<PathBuf>) -> Self {
        Self {
            prompts_dir: prompts_dir.unwrap_or_else(|| PathBuf::from("prompts")),
        }
    }
}

impl PromptRegistry for FilePromptRegistry {
    fn get_template(&self, name: &str) -> Result<String, PromptError> {
        let path = self.prompts_dir.join(format!("{}.yml", name));

        if !path.exists() {
            if name == ANALYSIS_TEMPLATE {
                tracing::debug!(path = %path.display(), "using built-in analysis template");
                return Ok(DEFAULT_ANALYSIS_TEMPLATE.to_string());
            }
            return Err(PromptError::TemplateNotFound(name.to_string()));
        }

        let content = fs::read_to_string(&path).map_err(|e| {
            PromptError::InvalidTemplate(format!("failed to read {}: {}", path.display(), e))
        })?;
        extract_template(&content)
    }
}

/// Extracts the `template` field from a YAML prompt file.
fn extract_template(yaml_content: &str) -> Result<String, PromptError> {
    use yaml_rust::YamlLoader;

    let docs = YamlLoader::load_from_str(yaml_content)
        .map_err(|e| PromptError::InvalidTemplate(format!("invalid YAML: {}", e)))?;

    let Some(doc) = docs.first() else {
        return Err(PromptError::InvalidTemplate("empty YAML document".to_string()));
    };

    doc["template"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| PromptError::InvalidTemplate("no template field found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_template() {
        let yaml = r#"
name: analysis_code
description: Test prompt
template: |
  Request: {{input.instruction}}
  Language: {{input.language}}
"#;
        let template = extract_template(yaml).unwrap();
        assert!(template.starts_with("Request: {{input.instruction}}\n"));
    }

    #[test]
    fn test_extract_template_missing() {
        let yaml = "name: analysis_code\n";
        assert!(matches!(extract_template(yaml), Err(PromptError::InvalidTemplate(_))));
    }

    #[test]
    fn test_missing_analysis_file_falls_back_to_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let registry = FilePromptRegistry::new(Some(dir.path().to_path_buf()));
        assert_eq!(
            registry.get_template(ANALYSIS_TEMPLATE).unwrap(),
            DEFAULT_ANALYSIS_TEMPLATE
        );
        assert!(matches!(
            registry.get_template("vision"),
            Err(PromptError::TemplateNotFound(name)) if name == "vision"
        ));
    }

    #[test]
    fn test_file_overrides_builtin() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("analysis_code.yml"),
            "template: \"Only {{input.instruction}}\"\n",
        )
        .unwrap();
        let registry = FilePromptRegistry::new(Some(dir.path().to_path_buf()));
        assert_eq!(registry.get_template(ANALYSIS_TEMPLATE).unwrap(), "Only {{input.instruction}}");
    }

    #[test]
    fn test_builtin_template_populates() {
        #[derive(serde::Serialize)]
        struct Input {
            instruction: &'static str,
            language: &'static str,
            language_label: &'static str,
            data_info: &'static str,
        }
        let prompt = crate::contexts::populate(
            DEFAULT_ANALYSIS_TEMPLATE,
            &Input {
                instruction: "PCR 결과 비교",
                language: "r",
                language_label: "R",
                data_info: "data.csv",
            },
        )
        .unwrap();
        assert!(prompt.contains("```r\n"));
        assert!(prompt.contains("**분석 언어:** R"));
        assert!(!prompt.contains("{{"));
    }
}
