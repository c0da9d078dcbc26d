//! Application core — session orchestration and domain logic.
//!
//! This module contains the business rules of the roaster core: session
//! lifecycle, background polling, command validation, and the status
//! documents handed to callers.  All interaction with hardware happens
//! through the **port traits** defined in [`ports`], keeping this layer
//! testable without a physical roaster.

pub mod commands;
pub mod events;
mod poller;
pub mod ports;
pub mod service;
mod session;
