//! Rate limiting logic and gated invocation.

mod backend;
mod invoker;
mod limiter;
mod window;

pub use backend::Admission;
pub use invoker::{GatedInvoker, InvokeError};
pub use limiter::RateLimiter;
pub use window::{TimeUnit, WindowConfig};
