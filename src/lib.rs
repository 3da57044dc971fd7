//! # Frame Relay Core Library
//!
//! This crate is the core of the `frame_relay` service: a TCP relay that
//! accepts JPEG uploads from camera devices, runs them through a detection
//! stage, and serves the most recent result to HTTP viewers on the same port.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered configuration (defaults, TOML file, `FRAME_RELAY_*`
//!   environment) built on `figment`. See `config::RelayConfig`.
//! - **`detection`**: The `DetectionCapability` trait, the motion and
//!   passthrough backends, and the JSON detection summary.
//! - **`error`**: The `RelayError` enum used across the crate.
//! - **`logging`**: `tracing` subscriber setup.
//! - **`network`**: Listener, connection sniffing, upload receiver, HTTP read
//!   server and a small client used by tools and tests.
//! - **`storage`**: Best-effort persistence of the last upload per device.
//! - **`store`**: The per-device freshness gate and the global publish slot.

pub mod config;
pub mod detection;
pub mod error;
pub mod logging;
pub mod network;
pub mod storage;
pub mod store;
