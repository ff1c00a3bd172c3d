pub mod assistant;
pub mod config;
pub mod db;
pub mod embedder;
pub mod groups;
pub mod labeler;
pub mod logging;
pub mod mailer;
pub mod pipeline;
pub mod store;
