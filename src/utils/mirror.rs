use std::env;

pub const DEFAULT_MIRROR: &str = "https://nodejs.org/dist";

/// Environment variables that may override the mirror, highest priority first.
pub const MIRROR_ENV_VARS: [&str; 4] = [
    "NODE_MIRROR",
    "NVM_NODEJS_ORG_MIRROR",
    "N_NODE_MIRROR",
    "NODIST_NODE_MIRROR",
];

/// Picks the base URL release artifacts are fetched from.
///
/// An explicit mirror wins, then the first non-empty environment override,
/// then the official distribution site.
pub fn resolve_mirror(explicit: Option<&str>) -> String {
    resolve_mirror_with(explicit, |name| env::var(name).ok())
}

pub fn resolve_mirror_with<F>(explicit: Option<&str>, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(mirror) = explicit.filter(|m| !m.trim().is_empty()) {
        return mirror.trim().to_string();
    }

    MIRROR_ENV_VARS
        .iter()
        .filter_map(|name| lookup(name))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_MIRROR.to_string())
}
