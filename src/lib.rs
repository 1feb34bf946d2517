//! fxcache library
//!
//! A time-bounded HTTP response cache (`cache`), the transport it wraps
//! (`http`), a currency rate client built on top of it (`currency`) and the
//! dummy rate server used to exercise it (`server`).

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod currency;
pub mod http;
pub mod server;
