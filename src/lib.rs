#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod model;
pub mod tokenizer;

pub use error::{AttentionError, Result};
