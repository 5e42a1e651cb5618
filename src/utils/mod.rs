//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_checksum, matches_any, read_file_content, title_from_path};
pub use retry::{RetryConfig, RetryResult, Retryable, with_retry};
pub use text::{estimate_tokens, extract_keywords, normalize_whitespace};
