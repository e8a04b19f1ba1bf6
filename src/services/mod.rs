pub mod dual_writer;
pub mod event_reclaimer;
pub mod expiry_sweeper;
pub mod metrics;
pub mod photo_service;
pub mod quota_ledger;
pub mod saga;

pub use self::dual_writer::*;
pub use self::event_reclaimer::*;
pub use self::expiry_sweeper::*;
pub use self::metrics::*;
pub use self::photo_service::*;
pub use self::quota_ledger::*;
pub use self::saga::*;
