// Fixed-window rate limiting for the AI-backed and public endpoints.
// One persisted record per (identity, endpoint) pair; every backend sits behind
// `RateLimitStore` so the guard never knows which database it talks to.

pub mod client_ip;
pub mod dynamo;
pub mod guard;
pub mod memory;
pub mod models;
pub mod redis_store;
pub mod store;

pub use guard::RateLimitGuard;
pub use models::RateLimitPolicy;
pub use store::RateLimitStore;
