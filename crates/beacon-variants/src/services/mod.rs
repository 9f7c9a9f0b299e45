mod variant_service;

pub use variant_service::{AssignRequest, AssignmentPath, VariantError, VariantService};
