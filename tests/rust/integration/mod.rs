//! Integration tests - parsing, merging, rewriting and rendering together

mod cte_tests;
mod merge_tests;
mod optimize_tests;
mod translation_tests;
