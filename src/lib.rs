//! One-time file sharing over HTTP.
//!
//! A client uploads a file and gets back a download link. The file is
//! deleted after its first complete download or after a fixed time-to-live,
//! whichever comes first.
//!
//! - [`storage`] - blob store over the upload directory
//! - [`relay`] - record registry, expiry timers and the transfer gateway
//! - [`http`] - axum surface (`POST /share`, `GET /share/{filename}`)
//! - [`config`] - layered configuration

pub mod config;
pub mod constants;
pub mod http;
pub mod logging;
pub mod relay;
pub mod storage;
