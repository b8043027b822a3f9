pub mod generation_tasks;
pub mod payment_records;
pub mod points_history;
pub mod users;

pub use generation_tasks as generation_task_entity;
pub use generation_tasks::TaskStatus;
pub use payment_records as payment_record_entity;
pub use payment_records::PaymentStatus;
pub use points_history as points_history_entity;
pub use points_history::{PointsAction, PointsType};
pub use users as user_entity;
