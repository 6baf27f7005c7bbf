// Domain layer - Telemetry model, alert rules and daily reports
pub mod alert;
pub mod calendar;
pub mod history;
pub mod report;
pub mod synthetic;
pub mod telemetry;
