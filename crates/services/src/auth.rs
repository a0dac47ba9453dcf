/// Verifies broadcaster credentials. The control plane depends on this
/// interface only, so deployments can swap the backing check without
/// touching the routes.
pub trait CredentialCheck: Send + Sync + 'static {
    fn verify(&self, passphrase: &str) -> bool;
}

/// A single shared passphrase from configuration.
///
/// An empty configured passphrase disables broadcasting entirely rather
/// than accepting everything.
pub struct StaticPassphrase {
    secret: String,
}

impl StaticPassphrase {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialCheck for StaticPassphrase {
    fn verify(&self, passphrase: &str) -> bool {
        !self.secret.is_empty() && passphrase == self.secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_passphrase_accepted() {
        let check = StaticPassphrase::new("ao-vivo");
        assert!(check.verify("ao-vivo"));
    }

    #[test]
    fn test_wrong_passphrase_rejected() {
        let check = StaticPassphrase::new("ao-vivo");
        assert!(!check.verify("errado"));
        assert!(!check.verify(""));
    }

    #[test]
    fn test_empty_secret_rejects_everything() {
        let check = StaticPassphrase::new("");
        assert!(!check.verify(""));
        assert!(!check.verify("qualquer"));
    }
}
