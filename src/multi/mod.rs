pub mod compare;
pub mod multi_check;

pub use compare::CompareCheck;
pub use multi_check::{Child, MultiCheck};
