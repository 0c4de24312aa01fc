pub mod category;
pub mod comment;
pub mod follow;
pub mod post;
pub mod product;
pub mod review;
pub mod session;
pub mod status;
pub mod user;

pub use category::{Entity as Category, Model as CategoryModel};
pub use comment::{Entity as Comment, Model as CommentModel};
pub use follow::{Entity as Follow, Model as FollowModel};
pub use post::{Entity as Post, Model as PostModel};
pub use product::{Entity as Product, Model as ProductModel};
pub use review::{Entity as Review, Model as ReviewModel};
pub use session::{Entity as Session, Model as SessionModel};
pub use status::{
    CategoryStatus, ContentStatus, Lifecycle, PostType, ProductStatus, ReviewStatus, UserRole,
    UserStatus,
};
pub use user::{Entity as User, Model as UserModel};
