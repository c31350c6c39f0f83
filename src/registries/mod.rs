mod prompt_registry;
mod model_registry;

pub use prompt_registry::{FilePromptRegistry, DEFAULT_ANALYSIS_TEMPLATE};
pub use model_registry::FileModelRegistry;
