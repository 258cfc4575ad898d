pub mod access;
pub mod address;
pub mod credential;
pub mod error;
pub mod gate;
pub mod handler;
pub mod models;
pub mod relay;
pub mod upstream_client;

pub use error::GatewayError;
pub use handler::{Gateway, GatewayState};
pub use models::ModelTable;
pub use upstream_client::{UpstreamClient, WreqUpstreamClient};
