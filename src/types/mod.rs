//! Request and response value types shared by the controller, the cache
//! stores and the network fetcher.

mod request;
mod response;

pub use request::{Request, RequestKey};
pub use response::Response;
