//! Use cases (application services)

pub mod device_service;
