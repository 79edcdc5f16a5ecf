/// Verifies transaction signatures on upstream responses. Keys and
/// signatures are opaque to the core.
pub trait SignatureVerifier {
    fn verify(&self, key: &str, message: &[u8], signature: &[u8]) -> bool;
}

/// Used when no verifier is wired in: every signed exchange fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectAll;

impl SignatureVerifier for RejectAll {
    fn verify(&self, _key: &str, _message: &[u8], _signature: &[u8]) -> bool {
        false
    }
}
