pub mod eye;
pub mod mode;

pub use eye::Eye;
pub use mode::MultiMode;
