use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

mod history;

pub use history::{clear_history, export_history, show_history};

use biolog::contexts::{
    extract_retry_delay, parse_response, render_analysis_prompt, AnalysisGenerator,
    CodeNormalizer, GeminiClient, ModelRegistry, ANALYSIS_TEMPLATE,
};
use biolog::data::{AnalysisRequest, AnalysisResult, CodeBlock, TargetLanguage};
use biolog::registries::{FileModelRegistry, FilePromptRegistry};
use biolog::session::Session;

#[derive(Clone, Copy)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
}

/// Options of `biolog generate`
pub struct GenerateOptions {
    pub instruction: String,
    pub language: TargetLanguage,
    pub profile: Option<PathBuf>,
    pub target: Option<String>,
    pub no_context: bool,
    pub no_cache: bool,
    pub caption: Option<String>,
}

pub fn generate(options: GenerateOptions, config: &Config) -> Result<()> {
    let session_path = Session::default_path();
    let mut session = Session::load(&session_path)?;

    let mut request = AnalysisRequest::new(options.instruction.clone(), options.language);
    if let Some(profile_path) = &options.profile {
        let profile = fs::read_to_string(profile_path)
            .with_context(|| format!("Failed to read data profile: {}", profile_path.display()))?;
        request = request.with_data_profile(profile);
    }
    if let Some(target) = &options.target {
        request = request.with_target_variable(target.clone());
    }
    if !options.no_context {
        request = request.with_history(session.context_window());
    }

    if config.verbose {
        println!(
            "Generating {} analysis with {} prior analysis(es) as context",
            options.language,
            request.history.len()
        );
    }

    let prompts = FilePromptRegistry::new(None);

    if config.dry_run {
        let prompt = render_analysis_prompt(&prompts, &request)
            .context("Failed to render analysis prompt")?;
        println!("[DRY RUN] Would send the following prompt:");
        println!("{}", prompt);
        return Ok(());
    }

    let mut settings = FileModelRegistry::new(None, None)
        .get_settings(ANALYSIS_TEMPLATE)
        .context("Failed to load model settings")?;
    if let Ok(model) = std::env::var("BIOLOG_MODEL") {
        if !model.trim().is_empty() {
            settings.model = model.trim().to_string();
        }
    }
    if config.verbose {
        println!("Using model {}", settings.model);
    }

    let client = GeminiClient::from_env(settings).context("Failed to set up the model client")?;
    let mut generator = AnalysisGenerator::new(prompts, client);
    if !options.no_cache {
        generator = generator.with_cache(None);
    }

    let result = match generator.generate(&request) {
        Ok(result) => result,
        Err(e) => {
            if let Some(wait) = e.suggested_wait_secs() {
                eprintln!("✗ Rate limit reached. Retry in {} seconds.", wait);
            }
            return Err(e).context("Failed to generate analysis");
        }
    };

    if config.verbose {
        println!("Code extracted from {:?}", result.source);
    }
    print_result(&result);

    let mut block = CodeBlock::from_result(options.language, &options.instruction, &result);
    if let Some(caption) = options.caption {
        block.caption = caption;
    }
    session.record(block);
    session.save(&session_path)?;

    println!("✓ Analysis recorded ({} in session)", session.len());
    Ok(())
}

/// Re-runs extraction and normalization over a saved model response.
pub fn normalize(input: Option<PathBuf>, language: TargetLanguage, json: bool, config: &Config) -> Result<()> {
    let raw = read_input(input.as_deref())?;

    let parsed = parse_response(&raw);
    if config.verbose {
        eprintln!("Code extracted from {:?}", parsed.source);
    }
    let code = CodeNormalizer::default().normalize(&parsed.code, language);

    if json {
        let result = AnalysisResult {
            code,
            interpretation: parsed.interpretation,
            warnings: parsed.warnings,
            raw_response: raw,
            source: parsed.source,
        };
        let output = serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
        println!("{}", output);
    } else {
        println!("{}", code);
    }
    Ok(())
}

pub fn retry_delay(text: &str) -> Result<()> {
    println!("{}", extract_retry_delay(text));
    Ok(())
}

fn print_result(result: &AnalysisResult) {
    println!("{}", result.code);
    if !result.interpretation.is_empty() {
        println!();
        println!("Interpretation:");
        println!("{}", result.interpretation);
    }
    if !result.warnings.is_empty() {
        println!();
        println!("Warnings:");
        println!("{}", result.warnings);
    }
    println!();
}

/// Reads the named file, or stdin when no file (or `-`) is given.
fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) if p != Path::new("-") => fs::read_to_string(p)
            .with_context(|| format!("Failed to read response file: {}", p.display())),
        _ => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read response from stdin")?;
            Ok(buffer)
        }
    }
}
