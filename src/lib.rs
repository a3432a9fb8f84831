pub mod api;
pub mod config;
pub mod dataset;
pub mod model;
pub mod notifier;
pub mod series;
pub mod source;
pub mod storage;
pub mod updater;
