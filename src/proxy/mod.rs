//
// src/proxy/mod.rs
//
mod proxy;
mod backend;
mod pool;

pub use proxy::{ProxyError, ReverseProxy};
pub use backend::Backend;
pub use pool::ServerPool;
