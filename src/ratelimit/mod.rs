//! Rate limiting decision logic.

mod key;
mod limiter;

pub use key::{IdentityClass, IdentityKey};
pub use limiter::{RateLimiter, DEFAULT_STORE_TIMEOUT};
