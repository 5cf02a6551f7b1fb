pub mod app;
pub mod audio;
pub mod capability;
pub mod config;
pub mod corruption;
pub mod element;
pub mod error;
pub mod fragment;
pub mod geometry;
pub mod lifecycle;
pub mod motion;
pub mod script;
pub mod sync;
pub mod telemetry;
pub mod terminal;
pub mod tuning;
