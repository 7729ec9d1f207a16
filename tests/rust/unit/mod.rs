//! Unit tests - public API edge cases that need no parsing round trips

mod config_tests;
mod expression_tests;
mod parser_robustness_tests;
