pub mod ingredients;
pub mod orders;
pub mod products;
pub mod recipes;
pub mod users;
