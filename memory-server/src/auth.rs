//! Bearer-token gate (§6). A small function run at the top of every
//! handler body except `/health`, short-circuiting with
//! `MemoryError::Unauthorized` on a missing or wrong token — the same
//! "guard function, not full middleware" shape the donor uses for its own
//! `Cors` wiring in `sola-solo/backend::main`, scaled down since this
//! service has exactly one gate to check.

use actix_web::HttpRequest;
use memory_core::MemoryError;

use crate::config::Config;

pub fn check(req: &HttpRequest, config: &Config) -> Result<(), MemoryError> {
    let Some(expected) = config.api_auth_token.as_deref() else {
        return Ok(());
    };

    let provided = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == expected => Ok(()),
        _ => Err(MemoryError::Unauthorized),
    }
}
