// Anonymous endpoints, limited per client IP.

pub mod handlers;
