//! Pulse kernel: state synchronisation core of the ServiceControl dashboard.
//!
//! Endpoint resolution, push channel, local notifier, polling scheduler and
//! the reducers that keep dashboard state consistent with the backend.

pub mod backend;
pub mod bus;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod events;
pub mod health;
pub mod http;
pub mod models;
pub mod mqtt;
pub mod notifier;
pub mod poller;
pub mod reducers;
pub mod scope;
pub mod session;
pub mod state;
pub mod store;
pub mod validator;
pub mod views;

pub use error::{PulseError, Result};
