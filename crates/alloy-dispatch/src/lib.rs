pub mod config;
pub mod crm;
pub mod error;
pub mod phone;
pub mod telemetry;
pub mod workflows;
