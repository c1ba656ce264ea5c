pub mod common;

mod accounts;
mod admin;
mod orders;
mod services;

pub use accounts::*;
pub use admin::*;
pub use orders::*;
pub use services::*;
