mod client;
mod extract;

pub use client::GeminiClient;
pub use extract::{extract_json, extract_sql};
