//! Client side of read and subscribe interactions.

pub mod cache;
pub mod callback;
pub mod read_client;
pub mod reassembly;
pub mod registry;

pub use cache::{CachedCallback, ClusterStateCache};
pub use callback::ReadClientCallback;
pub use read_client::{ClientInteraction, ClientState, ReadClient, ReadPrepareParams};
pub use registry::{ClientHandle, ClientRegistry};
