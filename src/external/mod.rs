pub mod apimart;
pub mod creem;

pub use apimart::*;
pub use creem::*;
