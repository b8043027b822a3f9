pub mod common;
pub mod generation;
pub mod pagination;
pub mod payment;
pub mod points;

pub use common::*;
pub use generation::*;
pub use pagination::*;
pub use payment::*;
pub use points::*;
