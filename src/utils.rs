use tracing::error;

// For signature verification
use hex::decode as hex_decode;
use hmac::{Hmac, Mac};
use sha1::Sha1;
type HmacSha1 = Hmac<Sha1>;

/// Helper function for verifying the Nexus webhook signature.
/// Nexus sends `X-Nexus-Webhook-Signature` as the hex HMAC-SHA1 of the raw body.
pub fn verify_nexus_signature(secret: &str, payload: &[u8], signature_header: &str) -> bool {
    let mut mac = match HmacSha1::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    let my_sig = mac.finalize().into_bytes();

    match hex_decode(signature_header.trim()) {
        Ok(nexus_signature_bytes) => {
            // Constant-time comparison
            my_sig.as_slice() == nexus_signature_bytes.as_slice()
        }
        Err(_) => {
            error!("Signature header is not valid hex");
            false
        }
    }
}
