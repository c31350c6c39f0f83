pub mod analysis;
pub mod cache;
pub mod code_line;

pub use analysis::{
    caption_for, AnalysisRequest, AnalysisResult, CodeBlock, ExtractionSource, TargetLanguage,
    CONTEXT_WINDOW,
};
pub use cache::Cache;
pub use code_line::{CodeLine, LineKind};
