mod line_scan;
mod file_cache;
mod analysis_generator;
mod model_client;
pub mod comment_classifier;
pub mod statement_splitter;
pub mod response_parser;
pub mod code_normalizer;
pub mod retry_advisor;

pub use file_cache::{FileCache, DEFAULT_CACHE_ROOT};
pub use analysis_generator::{
    AnalysisGenerator, GenerationError, ModelRegistry, PromptError, PromptRegistry,
    RegistryError, ANALYSIS_TEMPLATE, history_context, populate, render_analysis_prompt,
};
pub use model_client::{GeminiClient, GenerationSettings, ModelClient, DEFAULT_API_BASE, DEFAULT_MODEL};
pub use comment_classifier::{CommentClassifier, HangulProse, NonAsciiProse, ProseIndicator};
pub use statement_splitter::StatementSplitter;
pub use response_parser::{parse_response, ParsedResponse};
pub use code_normalizer::{normalize, CodeNormalizer};
pub use retry_advisor::{extract_retry_delay, is_rate_limit_error, DEFAULT_RETRY_DELAY_SECS};
