use secrecy::{ExposeSecret, SecretString};

pub const REDACTED: &str = "[REDACTED]";

/// Where the API key travels on the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialPlacement {
    /// Raw key in a named header, e.g. `x-api-key`.
    Header(String),
    /// `Authorization: Bearer <key>`
    Bearer,
}

/// API key supplied by the caller. Never serialized and never printed.
#[derive(Clone)]
pub struct Credential {
    secret: SecretString,
    placement: CredentialPlacement,
}

impl Credential {
    pub fn new(secret: impl Into<String>, placement: CredentialPlacement) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            placement,
        }
    }

    pub fn header(name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::new(secret, CredentialPlacement::Header(name.into()))
    }

    pub fn bearer(secret: impl Into<String>) -> Self {
        Self::new(secret, CredentialPlacement::Bearer)
    }

    pub fn placement(&self) -> &CredentialPlacement {
        &self.placement
    }

    pub fn is_empty(&self) -> bool {
        self.secret.expose_secret().trim().is_empty()
    }

    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.placement {
            CredentialPlacement::Header(name) => {
                request.header(name.as_str(), self.secret.expose_secret())
            }
            CredentialPlacement::Bearer => request.bearer_auth(self.secret.expose_secret()),
        }
    }

    /// Replaces every occurrence of the key in `text`.
    pub fn redact(&self, text: &str) -> String {
        let secret = self.secret.expose_secret();
        if secret.is_empty() {
            return text.to_string();
        }
        text.replace(secret, REDACTED)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &REDACTED)
            .field("placement", &self.placement)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_secret() {
        let credential = Credential::header("x-api-key", "sk-live-123");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("sk-live-123"));
        assert!(printed.contains(REDACTED));
    }

    #[test]
    fn test_redact_replaces_all_occurrences() {
        let credential = Credential::bearer("abc123");
        assert_eq!(
            credential.redact("key abc123 rejected (abc123)"),
            "key [REDACTED] rejected ([REDACTED])"
        );
        assert_eq!(Credential::bearer("").redact("abc"), "abc");
        assert!(Credential::bearer("  ").is_empty());
    }
}
