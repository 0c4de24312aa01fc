//! String-backed enums stored in `status`, `role` and `post_type` columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

macro_rules! column_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Unrecognized input falls back to `default` instead of failing.
            pub fn coerce(raw: Option<&str>, default: Self) -> Self {
                raw.and_then(|s| s.parse().ok()).unwrap_or(default)
            }
        }

        impl FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

column_enum!(UserRole {
    User => "user",
    Moderator => "moderator",
    Admin => "admin",
});

column_enum!(UserStatus {
    Active => "active",
    Inactive => "inactive",
    Banned => "banned",
    Deleted => "deleted",
});

column_enum!(
    /// Posts and comments.
    ContentStatus {
        Active => "active",
        Inactive => "inactive",
        Hidden => "hidden",
        Deleted => "deleted",
    }
);

column_enum!(ReviewStatus {
    Active => "active",
    Inactive => "inactive",
    Deleted => "deleted",
});

column_enum!(ProductStatus {
    Active => "active",
    Inactive => "inactive",
    Draft => "draft",
});

column_enum!(CategoryStatus {
    Active => "active",
    Inactive => "inactive",
});

column_enum!(PostType {
    Discussion => "discussion",
    Question => "question",
    Review => "review",
    News => "news",
});

/// Status moves allowed through ordinary updates. `deleted` is reachable
/// from every state and never left.
pub trait Lifecycle: Copy + PartialEq {
    fn is_terminal(&self) -> bool;

    fn can_become(&self, _next: Self) -> bool {
        !self.is_terminal()
    }
}

impl Lifecycle for ContentStatus {
    fn is_terminal(&self) -> bool {
        *self == ContentStatus::Deleted
    }
}

impl Lifecycle for ReviewStatus {
    fn is_terminal(&self) -> bool {
        *self == ReviewStatus::Deleted
    }
}

impl Lifecycle for ProductStatus {
    fn is_terminal(&self) -> bool {
        false
    }
}

impl Lifecycle for UserStatus {
    fn is_terminal(&self) -> bool {
        *self == UserStatus::Deleted
    }
}
