//! Identity resolution for commands that sign or acknowledge.
//!
//! Signing a document or acknowledging an alert records who did it. Rather
//! than requiring `--as` on every invocation, identity is resolved through a
//! chain:
//!
//! 1. `--as <identity>`: explicit per-command override
//! 2. `DIVEOPS_IDENTITY` env var: set once per terminal or station
//! 3. `identity` in `~/.diveops/config.toml`: default for a single-user machine

use std::env;

use crate::config::Config;

pub const IDENTITY_ENV: &str = "DIVEOPS_IDENTITY";

/// Error message shown when identity cannot be resolved.
pub const IDENTITY_REQUIRED: &str = "identity required: pass --as <identity>, \
    set DIVEOPS_IDENTITY, or add `identity = \"...\"` to ~/.diveops/config.toml";

/// Resolve the acting identity from the tiered resolution chain.
pub fn resolve_identity(explicit: Option<&str>, config: &Config) -> Result<String, String> {
    resolve_with(explicit, env::var(IDENTITY_ENV).ok(), config)
}

fn resolve_with(
    explicit: Option<&str>,
    from_env: Option<String>,
    config: &Config,
) -> Result<String, String> {
    let non_empty = |s: &String| !s.trim().is_empty();

    explicit
        .map(str::to_string)
        .filter(non_empty)
        .or(from_env.filter(non_empty))
        .or_else(|| config.identity.clone().filter(non_empty))
        .ok_or_else(|| IDENTITY_REQUIRED.to_string())
}
