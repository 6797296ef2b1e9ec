// AI rewrite of a single resume section, guarded by the per-user rate limit,
// input sanitization and output validation.

pub mod handlers;
pub mod prompts;
