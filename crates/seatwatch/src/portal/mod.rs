//! Client for the third-party course-registration portal.

mod client;
mod error;
mod types;

pub use client::PortalClient;
pub use error::PortalError;
pub use types::{AttemptOutcome, ClassSection, LoginOutcome, RegisteredClass};

/// The subset of portal operations the waitlist and scheduler engines use.
///
/// The concrete implementation is [`PortalClient`]; tests substitute a fake.
#[allow(async_fn_in_trait)]
pub trait Portal {
    /// Current list of sections for a course within a registration period.
    async fn get_class_sections(
        &self,
        period_id: &str,
        course_code: &str,
    ) -> Result<Vec<ClassSection>, PortalError>;

    /// Submits a registration for a section. The automated paths pass no
    /// verification token; the portal trusts the bearer session.
    async fn register_for_class(
        &self,
        class_id: &str,
        verification_token: Option<&str>,
    ) -> Result<AttemptOutcome, PortalError>;
}
