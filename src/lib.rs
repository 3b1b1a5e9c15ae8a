pub mod auth;
pub mod config;
pub mod db;
pub mod entity;
pub mod migration;
pub mod page_cache;
pub mod paginator;
pub mod test;
pub mod web;
