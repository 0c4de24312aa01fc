use serde::Deserialize;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Newest,
    Oldest,
    Views,
    Comments,
    Rating,
}

impl FromStr for SortKey {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(Self::Newest),
            "oldest" => Ok(Self::Oldest),
            "views" => Ok(Self::Views),
            "comments" => Ok(Self::Comments),
            "rating" => Ok(Self::Rating),
            _ => Err(()),
        }
    }
}

/// Per-listing map from sort key to a fixed `ORDER BY` fragment. Keys a
/// listing does not support, and unknown keys, use `newest`.
#[derive(Debug, Clone, Copy)]
pub struct SortTable {
    pub newest: &'static str,
    pub oldest: &'static str,
    pub views: Option<&'static str>,
    pub comments: Option<&'static str>,
    pub rating: Option<&'static str>,
}

impl SortTable {
    pub fn order_by(&self, key: Option<SortKey>) -> &'static str {
        let picked = match key {
            Some(SortKey::Oldest) => Some(self.oldest),
            Some(SortKey::Views) => self.views,
            Some(SortKey::Comments) => self.comments,
            Some(SortKey::Rating) => self.rating,
            Some(SortKey::Newest) | None => None,
        };
        picked.unwrap_or(self.newest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: SortTable = SortTable {
        newest: "p.created_at DESC",
        oldest: "p.created_at ASC",
        views: Some("p.view_count DESC"),
        comments: Some("comment_count DESC"),
        rating: None,
    };

    fn key(raw: &str) -> Option<SortKey> {
        raw.parse().ok()
    }

    #[test]
    fn known_keys_map_to_fixed_fragments() {
        assert_eq!(TABLE.order_by(key("views")), "p.view_count DESC");
        assert_eq!(TABLE.order_by(key("OLDEST")), "p.created_at ASC");
    }

    #[test]
    fn unknown_or_injected_keys_fall_back() {
        assert_eq!(TABLE.order_by(key("bogus")), "p.created_at DESC");
        assert_eq!(
            TABLE.order_by(key("id; DROP TABLE posts")),
            "p.created_at DESC"
        );
        assert_eq!(TABLE.order_by(None), "p.created_at DESC");
    }

    #[test]
    fn unsupported_key_uses_default() {
        assert_eq!(TABLE.order_by(Some(SortKey::Rating)), "p.created_at DESC");
    }
}
