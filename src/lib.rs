// Library exports for Forkful
// Integration tests drive the router through these modules.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod images;
pub mod moderation;
pub mod notifications;
pub mod owner;
pub mod pagination;
pub mod restaurants;
pub mod reviews;
pub mod routes;
pub mod settings;
pub mod state;
pub mod users;
