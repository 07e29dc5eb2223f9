//! Tests for the executor
//!
//! Organized by feature area

mod helpers;

mod basic_tests;
mod break_tests;
mod function_tests;
mod loop_tests;
mod try_tests;
