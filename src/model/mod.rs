pub mod assessment;
pub mod profile;
pub mod reading;
pub mod status;

pub use assessment::{Alert, HealthAssessment, HealthStatus, Issue, IssueType, Severity};
pub use profile::CareProfile;
pub use reading::{EnrichedReading, Reading, StoredReading};
pub use status::CondensedStatus;
