pub mod cookie;
pub mod json_column;
pub mod lenient;
pub mod markdown;
pub mod password;
pub mod sort;
pub mod token;
pub mod validation;

pub use markdown::{render_markdown, strip_tags};
pub use password::{hash_password, verify_password};
pub use validation::{require_text, validate_payload};
