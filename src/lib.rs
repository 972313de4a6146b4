pub mod error;
pub mod http;
pub mod media;
pub mod middleware;
pub mod models;
pub mod orm;
pub mod router;
pub mod settings;
pub mod template;
pub mod urls;
pub mod views;
