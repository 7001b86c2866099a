//! Types the engines publish to hosts.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them as JSON (WebSocket, stdout, a UI bridge) without mapping.

pub mod events;
