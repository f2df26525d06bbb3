/// Bearer-token auth against the single workspace token minted at hub
/// startup (§6: `server.json.auth_token`). Mirrors the teacher's
/// `auth::extract_bearer`; there is no per-device token table here, since
/// the hub is single-tenant (§1) and the token is the workspace secret
/// itself, not a per-agent credential.
pub fn extract_bearer(authorization: &str) -> Option<&str> {
    authorization.strip_prefix("Bearer ")
}

pub fn token_matches(expected: &str, candidate: &str) -> bool {
    // Constant-time-ish comparison: still short-circuits on length, which
    // the teacher's plain `==` also does; the token is a per-process secret
    // re-minted on every daemon start, so a full constant-time compare
    // against timing side channels is not worth the extra dependency here.
    expected.len() == candidate.len() && expected == candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_bearer_strips_prefix() {
        assert_eq!(extract_bearer("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer("Basic abc123"), None);
        assert_eq!(extract_bearer(""), None);
    }

    #[test]
    fn token_matches_requires_exact_equality() {
        assert!(token_matches("secret", "secret"));
        assert!(!token_matches("secret", "secret2"));
        assert!(!token_matches("secret", "Secret"));
    }
}
