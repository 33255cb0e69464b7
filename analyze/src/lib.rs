pub mod config;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod heldout;
pub mod inspect;
pub mod lemma;
pub mod models;
pub mod pipeline;
pub mod store;
pub mod sweep;
pub mod text;
pub mod topic_modeling;
pub mod vocabulary;
