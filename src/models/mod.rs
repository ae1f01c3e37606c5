//! Data models shared by the view, the stores and the state engine.

pub mod aspath;
pub mod elem;
pub mod network;

pub use aspath::*;
pub use elem::*;
pub use network::*;
