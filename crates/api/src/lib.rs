//! HTTP control surface for the notification engine.

pub mod routes;
pub mod state;
