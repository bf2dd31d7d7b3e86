//! Cross-module choreography tests.

pub mod late_join;
