//! Token value generation.

use rand::Rng;

/// Generate an unguessable token value: 16 random bytes, hex encoded.
pub fn generate_token_value() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 16] = rng.r#gen();
    hex::encode(bytes)
}

mod hex {
    /// Encode bytes to lowercase hex.
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes
            .as_ref()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}
