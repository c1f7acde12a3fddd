pub mod app;
pub mod attendance;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod desk;
pub mod error;
pub mod format;
pub mod reports;
pub mod response;
pub mod state;
pub mod storage;
pub mod subjects;
pub mod users;
