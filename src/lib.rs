pub mod app_config;
pub mod domain;
pub mod query;
pub mod registry;
pub mod web;
