// src/ingest/providers/mod.rs
pub mod behance;
pub mod designer_news;
pub mod dribbble;
pub mod nodes;
