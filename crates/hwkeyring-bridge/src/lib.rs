//! hwkeyring bridge - request/response protocol with the signing surface
//!
//! The bridge talks to the hardware device through a host-owned signing
//! surface. It is reached over a duplex [`MessageChannel`]; the surface itself
//! is opened, focused and closed through a [`SurfaceHost`]. Both are traits so
//! the embedding host supplies the real thing and tests supply fakes.

pub mod channel;
pub mod client;
pub mod config;
pub mod local;
pub mod message;
pub mod surface;

pub use channel::{ChannelConnector, Inbox, ListenerId, MessageChannel};
pub use client::{BridgeClient, GENERIC_FAILURE_MESSAGE};
pub use config::BridgeConfig;
pub use local::{LocalChannel, LocalConnector, RemoteEnd};
pub use message::{tags, Inbound, Operation, Request, WireMessage};
pub use surface::{Placement, SigningSurface, SurfaceHost, SurfaceState, TabRef};
