//! Context acquisition, install order and rebuild on invalidation

pub mod acquire_test;
pub mod rebuild_test;
