pub mod encoder;
pub mod request;
pub mod response;
pub mod server;
