#![forbid(unsafe_code)]

pub mod albums;
pub mod backgrounds;
pub mod books;
pub mod build;
pub mod catalog;
pub mod cli;
pub mod compose;
pub mod config;
pub mod cover_cache;
pub mod formats;
pub mod http;
pub mod layout;
pub mod logging;
pub mod overlays;
pub mod palette;
pub mod spotify;
pub mod themes;
pub mod typography;
