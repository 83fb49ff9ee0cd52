pub mod error;
pub mod memory;
pub mod report_repo;
pub mod user_repo;

pub use error::{RepoError, RepoResult};
pub use memory::{MemoryReportStore, MemoryUserStore};
pub use report_repo::{PgReportStore, ReportRow, ReportStore};
pub use user_repo::{PgUserStore, UserRow, UserStore};
