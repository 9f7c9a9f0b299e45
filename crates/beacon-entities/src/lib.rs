//! Persisted document shapes and the typed write models that produce them

pub mod session;
pub mod variant;

pub use session::{
    ActionRecord, DeviceProfile, DeviceType, EventKind, GeoMethod, GeoProfile, SessionDocument,
    SessionStart, Utm, VariantRef,
};
pub use variant::{
    NewVariant, VariantDocument, VariantPatch, DEFAULT_CTA_HREF, DEFAULT_CTA_TEXT,
    DEFAULT_SHOW_CAP,
};
