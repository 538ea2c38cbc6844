mod expression;
mod module;
mod statement;
mod type_ref;

pub use expression::*;
pub use module::*;
pub use statement::*;
pub use type_ref::*;
