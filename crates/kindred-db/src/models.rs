/// Database row types that never leave the server.
/// Public shapes live in kindred-types.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}
