pub mod accounts;
pub mod addresses;
pub mod admin;
pub mod catalog;
pub mod orders;
pub mod ratings;
pub mod services;
pub mod technician;
