pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod log_view;
pub mod output;
pub mod render;
pub mod snapshot;

pub use client::{CollectionRequest, ControlApi, HttpControlClient, StartResponse};
pub use controller::{
    Affordances, CollectionController, CollectionForm, CollectionPhase, PanelEvent, PanelStatus,
};
pub use error::{Error, Result};
pub use log_view::{LOG_CAPACITY, LogView};
pub use render::LogEntry;
pub use snapshot::PollSnapshot;
