//! Minimal storage acceptor used as a loopback peer.

pub mod receiver;

pub use receiver::StoreReceiver;
