pub mod annotations;
pub mod ingredients;
pub mod recipes;
pub mod relations;
pub mod shopping_cart;
pub mod tags;
pub mod users;

pub use ingredients::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;
