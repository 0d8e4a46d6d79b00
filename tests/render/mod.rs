//! Frame pipeline: tiles, projection edge cases and weaving

pub mod pipeline_test;
