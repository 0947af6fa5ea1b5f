//! Types shared by every vault crate: API payloads, the permission model,
//! storage notifications and the object key formats.

pub mod api;
pub mod events;
pub mod keys;
pub mod models;
pub mod permission;

pub use permission::Permission;
