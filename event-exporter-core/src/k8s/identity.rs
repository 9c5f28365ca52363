use sha2::{Digest, Sha256};

/// Derives the internal collection name for a cluster identity (the control
/// plane endpoint URL): a 16-hex-character prefix of SHA-256(identity).
///
/// Grounded on spec §3 "Cluster Identity" / §4.5 step 6; the Go original
/// (`pkg/events/sinks/pipes/mongodb.go`) truncates the hex digest the same
/// way.
pub fn collection_name_for_identity(identity: &str) -> String {
    let digest = Sha256::digest(identity.as_bytes());
    let hex = format!("{digest:x}");
    hex[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_is_stable_and_16_hex_chars() {
        let a = collection_name_for_identity("https://cluster-a.example.com");
        let b = collection_name_for_identity("https://cluster-a.example.com");
        let c = collection_name_for_identity("https://cluster-b.example.com");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
        assert!(a.chars().all(|ch| ch.is_ascii_hexdigit()));
    }
}
