pub mod report;
pub mod service;

pub use report::{
    OrphanAttribution, OrphanRecovery, OrphanedToken, ReconciliationReport, StaleListing,
};
pub use service::ReconciliationService;
