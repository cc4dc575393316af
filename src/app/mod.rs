//! Application layer: the port boundary and the control-loop service.

pub mod ports;
pub mod service;
