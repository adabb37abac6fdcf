//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions. Each service
//! focuses on a specific use case or feature area.

mod doctor;
pub mod escrow;
pub mod logging;
pub mod migration;
pub mod monitor;
mod status;

pub use doctor::{CheckResult, DoctorResult, DoctorService, DoctorSummary};
pub use escrow::{CreateDeal, EscrowService, ResolveDispute, SubmitWork, WalletView};
pub use logging::{EntryPoint, LogEntry, LogEvent, LoggingService};
pub use migration::{MigrationResult, MigrationService};
pub use monitor::{ConfirmationMonitor, MonitorLock, MonitorReport};
pub use status::{StatusCount, StatusService, StatusSummary};
