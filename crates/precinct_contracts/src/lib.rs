#![forbid(unsafe_code)]

pub mod api;
pub mod auth;
pub mod common;
pub mod discord;
pub mod profile;
pub mod shiftlog;

pub use common::{ContractViolation, FormErrors, UnixTimeMs};
