/// Identity used when the client address cannot be determined. Such requests
/// still share one counter, so an unresolvable identity is limited, not exempt.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Build the counting key for a client.
///
/// The layout is `[namespace:]client[:suffix]`, where the suffix is the
/// lower-cased `method:path` of a matched route override.
pub fn resolve_key(
    client_address: Option<&str>,
    namespace: &str,
    override_suffix: Option<&str>,
) -> String {
    let client = client_address.unwrap_or(UNKNOWN_CLIENT);

    let mut key = if namespace.is_empty() {
        client.to_string()
    } else {
        format!("{}:{}", namespace, client)
    };

    if let Some(suffix) = override_suffix {
        key.push(':');
        key.push_str(suffix);
    }

    key
}
