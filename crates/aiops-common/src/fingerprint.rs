//! Content-addressed incident fingerprinting

use ring::digest::{digest, SHA256};

/// Compute the 64-hex incident fingerprint.
///
/// SHA-256 of `event_name:resource_type:resource_id:region`. Two incidents
/// with the same tuple always produce the same fingerprint, regardless of how
/// the raw event was encoded.
pub fn fingerprint(event_name: &str, resource_type: &str, resource_id: &str, region: &str) -> String {
    let raw = format!("{event_name}:{resource_type}:{resource_id}:{region}");
    let hash = digest(&SHA256, raw.as_bytes());
    hash.as_ref().iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_64_hex() {
        let fp = fingerprint("TerminateInstances", "compute", "i-abc", "us-east-1");
        assert_eq!(fp.len(), 64);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("TerminateInstances", "compute", "i-abc", "us-east-1");
        let b = fingerprint("TerminateInstances", "compute", "i-abc", "us-east-1");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_distinguishes_every_component() {
        let base = fingerprint("TerminateInstances", "compute", "i-abc", "us-east-1");
        assert_ne!(
            base,
            fingerprint("StopInstances", "compute", "i-abc", "us-east-1")
        );
        assert_ne!(
            base,
            fingerprint("TerminateInstances", "function", "i-abc", "us-east-1")
        );
        assert_ne!(
            base,
            fingerprint("TerminateInstances", "compute", "i-def", "us-east-1")
        );
        assert_ne!(
            base,
            fingerprint("TerminateInstances", "compute", "i-abc", "eu-west-1")
        );
    }
}
