/// Built-in service endpoints.
///
/// If `source` is already an `http(s)` URL, it is used as-is.
pub fn source_to_base_url(source: &str) -> Option<&'static str> {
    match source {
        "ecmwf" => Some("https://api.ecmwf.int/v1"),
        _ => None,
    }
}

pub fn is_http_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Resolve a configured source (name or URL) to a base URL without a trailing slash.
pub fn resolve_base_url(source: &str) -> Option<String> {
    let base = if is_http_url(source) {
        source
    } else {
        source_to_base_url(source)?
    };
    Some(base.trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_names_and_urls() {
        assert_eq!(
            resolve_base_url("ecmwf").as_deref(),
            Some("https://api.ecmwf.int/v1")
        );
        assert_eq!(
            resolve_base_url("http://localhost:8080/v1/").as_deref(),
            Some("http://localhost:8080/v1")
        );
        assert_eq!(resolve_base_url("cds"), None);
    }
}
