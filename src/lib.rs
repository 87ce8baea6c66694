pub mod calendar;
pub mod clock;
pub mod config;
pub mod engine;
pub mod limits;
pub mod logging;
pub mod model;
pub mod notify;
pub mod observability;
pub mod policy;
pub mod refresher;
pub mod wal;
