//! Integration tests: the full control loop against simulated hardware.

mod console_tests;
mod service_tests;
mod support;
