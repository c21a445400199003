//! Spreadsheet service: authentication, the HTTP client and tab selection

pub mod auth;
pub mod client;
pub mod tabs;
