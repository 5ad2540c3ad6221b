//! Task extraction: prompt construction, LLM calls, output validation
//! and due-date derivation.

mod due_date;
mod engine;
mod llm;
mod parse;
mod prompt;

pub use due_date::{add_business_days, clamp_due_date, derive_due_date, roll_weekend_forward};
pub use engine::ExtractionEngine;
pub use llm::{GeminiClient, LlmClient, LlmError};
pub use parse::{parse_llm_output, split_list, RawTaskRecord};
pub use prompt::{PromptError, PromptTemplate};
