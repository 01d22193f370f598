//! Contract risk analysis: parsing, clause classification, scoring, highlighting and reports.

pub mod classifier;
pub mod config;
pub mod highlight;
pub mod merge;
pub mod models;
pub mod parser;
pub mod pdf_fonts;
pub mod pdf_highlight;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod segment;
pub mod settings;
pub mod summarizer;
pub mod sweep;
