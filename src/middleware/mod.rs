pub mod request;
pub mod security;
pub mod session;

pub use session::SessionContext;
