pub mod builder;
pub mod handler;
pub mod listener;

pub use builder::{PeerService, ServerBuilder};
pub use handler::Dispatcher;
