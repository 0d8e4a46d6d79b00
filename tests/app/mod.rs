//! Bring-up, window events, exit statuses and configuration

pub mod app_test;
