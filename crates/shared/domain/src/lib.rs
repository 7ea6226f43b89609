//! # Domain Types
//!
//! Plain configuration types shared by the workspace. The only dependency is
//! `serde`; keep it that way: no I/O, networking or heavy logic here.

pub mod config;
