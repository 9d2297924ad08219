//! Middlewares for the presign gateway chain
//!
//! Signature verification plus the auxiliary request concerns (auth, rate
//! limiting, CORS, deadlines, request logging), each built on the chain
//! contract in [`crate::chain`].

mod auth;
mod cors;
mod logging;
mod rate_limit;
mod signature;
mod timeout;

pub use auth::*;
pub use cors::*;
pub use logging::*;
pub use rate_limit::*;
pub use signature::*;
pub use timeout::*;
