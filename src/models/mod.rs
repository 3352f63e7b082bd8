pub mod analyze;
pub mod openai;
