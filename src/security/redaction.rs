// Helpers to keep secrets and bulky remote payloads out of logs.
use std::env;

/// Redact a text body unless DEV_PRINT_SECRETS=1 is set in the environment.
/// By default this returns a short placeholder containing only the length.
pub fn redact_body(s: &str) -> String {
    if env::var("DEV_PRINT_SECRETS").ok().as_deref() == Some("1") {
        return s.to_string();
    }
    format!("<redacted len={}>", s.len())
}

/// Strip userinfo (`user:pass@`) from a URL before it is logged.
pub fn redact_url(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(mut parsed) => {
            if !parsed.username().is_empty() || parsed.password().is_some() {
                let _ = parsed.set_username("");
                let _ = parsed.set_password(None);
            }
            parsed.to_string()
        }
        Err(_) => "<invalid url>".to_string(),
    }
}
