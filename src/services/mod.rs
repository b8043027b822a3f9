pub mod generation_service;
pub mod payment_service;
pub mod points_ledger;

pub use generation_service::GenerationService;
pub use payment_service::{PaymentService, PaymentSettings, WebhookOutcome};
pub use points_ledger::{LedgerEntry, PointsLedger};
