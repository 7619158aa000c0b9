//! CLI > `SELKIES_<NAME>` env > legacy env > built-in default resolution.
//!
//! Grounded on `original_source/src/selkies/settings.py`'s precedence
//! comment (CLI overrides the standard env var, which overrides any
//! legacy per-setting env var, which overrides the default) (§6).

use std::env;
use std::str::FromStr;

/// Resolve a single setting through the four-source precedence chain.
///
/// `cli` is the value already parsed from the command line (`None` if the
/// flag was not passed). `std_env` is the standard `SELKIES_<NAME>` variable
/// name; `legacy_envs` lists older per-setting variable names kept for
/// backward compatibility, checked in order after the standard one.
pub fn resolve<T: FromStr>(cli: Option<T>, std_env: &str, legacy_envs: &[&str], default: T) -> T {
    if let Some(v) = cli {
        return v;
    }
    if let Ok(raw) = env::var(std_env) {
        if let Ok(v) = raw.parse() {
            return v;
        }
    }
    for name in legacy_envs {
        if let Ok(raw) = env::var(name) {
            if let Ok(v) = raw.parse() {
                return v;
            }
        }
    }
    default
}

/// Same as [`resolve`] but for an `Option<T>` setting (no built-in default
/// value, only a fallback of `None`).
pub fn resolve_opt<T: FromStr>(
    cli: Option<T>,
    std_env: &str,
    legacy_envs: &[&str],
) -> Option<T> {
    if cli.is_some() {
        return cli;
    }
    if let Ok(raw) = env::var(std_env) {
        if let Ok(v) = raw.parse() {
            return Some(v);
        }
    }
    for name in legacy_envs {
        if let Ok(raw) = env::var(name) {
            if let Ok(v) = raw.parse() {
                return Some(v);
            }
        }
    }
    None
}

/// Resolve a closed-set (`enum`) setting. `std_env`'s value may further
/// restrict the allowed set by supplying a comma-separated list whose first
/// element becomes the default, matching the source's env-narrowing scheme.
pub fn resolve_enum<T: FromStr + Clone>(
    cli: Option<T>,
    std_env: &str,
    allowed_csv_env: &str,
    default: T,
) -> Result<T, String> {
    if let Some(v) = cli {
        return Ok(v);
    }
    if let Ok(raw) = env::var(std_env) {
        return raw
            .parse()
            .map_err(|_| format!("invalid value for {std_env}: '{raw}'"));
    }
    if let Ok(raw) = env::var(allowed_csv_env) {
        if let Some(first) = raw.split(',').next() {
            if let Ok(v) = first.trim().parse() {
                return Ok(v);
            }
        }
    }
    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_wins_over_everything() {
        let v: u32 = resolve(Some(5), "SELKIES_TEST_DOES_NOT_EXIST", &[], 1);
        assert_eq!(v, 5);
    }

    #[test]
    fn default_when_nothing_set() {
        let v: u32 = resolve(None, "SELKIES_TEST_DOES_NOT_EXIST_EITHER", &[], 7);
        assert_eq!(v, 7);
    }

    #[test]
    fn env_wins_over_legacy_and_default() {
        env::set_var("SELKIES_TEST_PRECEDENCE", "42");
        let v: u32 = resolve(None, "SELKIES_TEST_PRECEDENCE", &["LEGACY_TEST_PRECEDENCE"], 1);
        assert_eq!(v, 42);
        env::remove_var("SELKIES_TEST_PRECEDENCE");
    }
}
