use sha2::{Digest, Sha256};
use uuid::Uuid;

const SEPARATOR: &str = "$";

/// Opaque room id shared by exactly one pair of users.
///
/// Both participants compute the same value without negotiating: the ids
/// are sorted before hashing, so argument order never matters.
pub fn compute_room_id(a: Uuid, b: Uuid) -> String {
    let mut ids = [a.to_string(), b.to_string()];
    ids.sort();

    let mut hasher = Sha256::new();
    hasher.update(ids.join(SEPARATOR).as_bytes());
    hex::encode(hasher.finalize())
}
