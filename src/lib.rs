//! Transform sync for canvas applet nodes.
//!
//! Local drags and resizes are sampled into timestamped batches, flushed to a
//! per-node store, and replayed by other clients with their original timing.
//! The [`sync`] module is the client core; [`routes`] and [`store::postgres`]
//! are the server side of the same store.

pub mod canvas;
pub mod config;
pub mod db;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
pub mod sync;
