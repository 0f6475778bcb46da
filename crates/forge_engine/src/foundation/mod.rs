//! Foundation utilities shared by every engine subsystem

pub mod collections;
pub mod logging;
