pub mod alarms;
pub mod config;
pub mod history;
pub mod seed;
pub mod train;
