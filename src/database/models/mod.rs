pub mod organisation;

pub use organisation::{Organisation, OrganisationStatus};
