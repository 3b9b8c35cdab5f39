pub mod cart;
pub mod category;
pub mod order;
pub mod payment_method;
pub mod product;
pub mod review;
pub mod user;
pub mod voucher;

pub use cart::{Cart, CartItem};
pub use category::Category;
pub use order::{Order, OrderStatus, PaymentStatus};
pub use payment_method::PaymentMethod;
pub use product::{Product, Variation};
pub use review::Review;
pub use user::{Address, User, UserRole};
pub use voucher::{DiscountType, Voucher};
