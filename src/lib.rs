// DCU telemetry - live controller telemetry, alerts and daily reports
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
