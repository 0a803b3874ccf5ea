//! Cluster-wide dispatch.
//!
//! Guarantees a single authoritative aggregator per metric identity by hashing
//! the identity over the current peer list. Membership and transport are
//! external collaborators behind the [`ClusterMembership`] and [`Transport`]
//! traits.

pub mod membership;
pub mod router;
pub mod transport;

pub use membership::{ClusterMembership, PeerAddress, StaticMembership};
pub use router::{route_index, select_peer, ClusterRouter, Dispatch, RemoteForwarder, RouterSnapshot};
pub use transport::{InProcessTransport, Transport};
