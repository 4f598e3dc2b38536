pub mod customer;
pub mod item;
pub mod review;

pub use customer::{Customer, NewCustomer};
pub use item::{Item, NewItem};
pub use review::{NewReview, Review};
