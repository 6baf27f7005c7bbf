// Application layer - Connection lifecycle, aggregation scheduling and storage seams
pub mod clock;
pub mod connection_manager;
pub mod daily_aggregator;
pub mod key_value_store;
pub mod producer;
pub mod report_store;
pub mod telemetry_hub;
pub mod transport;
