//! Matter Interaction Model read and subscribe reporting.
//!
//! Data model types live at this level. [`reporting`] is the server side,
//! [`client`] the client side, and [`loopback`] wires the two together in
//! process.

pub mod backoff;
pub mod client;
pub mod clusters;
pub mod codec;
pub mod data_model;
pub mod events;
pub mod icd;
pub mod ids;
pub mod loopback;
pub mod messages;
pub mod metadata;
pub mod path;
pub mod pool;
pub mod reporting;
pub mod status;
pub mod subscription_persistence;
pub mod transport;
pub mod value;
