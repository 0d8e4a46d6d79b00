//! Display access across modern and legacy runtimes

pub mod display_access_test;
