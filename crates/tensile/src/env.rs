use std::env;
use std::sync::OnceLock;

static TENSILE_PROFILE: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

pub(crate) fn profile_enabled() -> bool {
    *TENSILE_PROFILE.get_or_init(|| match env::var("TENSILE_PROFILE") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
