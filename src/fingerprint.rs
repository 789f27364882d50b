use sha2::{Digest, Sha256};

/// Compute the identity fingerprint of a listing.
///
/// Each field is trimmed and lower-cased before hashing, so casing and
/// surrounding whitespace never change the identity. The fingerprint is a
/// content hash, not a listing ID: a price or photo change on the same physical
/// item yields a different fingerprint.
pub fn fingerprint(title: &str, price_text: &str, image_url: Option<&str>) -> String {
    let key = format!(
        "{}|{}|{}",
        normalize(title),
        normalize(price_text),
        normalize(image_url.unwrap_or(""))
    );

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize(field: &str) -> String {
    field.trim().to_lowercase()
}
