pub mod address;
pub mod catalog;
pub mod order;
pub mod rating;
pub mod service;
pub mod user;

pub use address::Address;
pub use catalog::{Product, ProductCategory};
pub use order::{Order, OrderStatus};
pub use rating::TechnicianRating;
pub use service::{ServiceCategory, ServiceIssue, ServiceRequest, ServiceStatus};
pub use user::{Role, User};
