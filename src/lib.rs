//! Attendance appliance backend.
//!
//! Clients submit photographed QR codes and roster commands over a websocket;
//! the server decodes scans, records alternating sign-in/sign-out events in a
//! SQLite log, and pushes full-state snapshots to every connected dashboard
//! whenever anything changes.

pub mod broadcast;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod messages;
pub mod qr;
pub mod state;
