//! View consumers: adapters from the view event stream to files and
//! transport topics.

pub mod archiver;

#[cfg(feature = "kafka")]
pub mod view_sender;

pub use archiver::*;

#[cfg(feature = "kafka")]
pub use view_sender::*;
