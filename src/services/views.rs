//! Denormalized shapes shared by joined listings.

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Author {
    pub id: i32,
    pub username: String,
    pub full_name: String,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CategoryRef {
    pub id: i32,
    pub name: Option<String>,
}

/// Joined author columns, spelled the same way in every listing query.
pub const AUTHOR_COLUMNS: &str =
    "u.username AS author_username, u.full_name AS author_full_name, \
     u.profile_picture AS author_picture";
