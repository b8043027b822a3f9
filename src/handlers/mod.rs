pub mod generation;
pub mod payment;
pub mod points;
pub mod webhook;

pub use generation::generation_config;
pub use payment::payment_config;
pub use points::points_config;
pub use webhook::webhook_config;
