mod carts;
mod ingredients;
mod recipes;
mod tags;
mod users;

pub use carts::*;
pub use ingredients::*;
pub use recipes::*;
pub use tags::*;
pub use users::*;
