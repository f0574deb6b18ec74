//! Matter Interaction Model reporting library.
//!
//! Wildcard path expansion, dirty tracking and interval scheduling on the
//! server, chunked report generation under a message size bound, and on the
//! client side chunk reassembly into a versioned cluster state cache.

pub mod config;
pub mod error;
pub mod matter;
