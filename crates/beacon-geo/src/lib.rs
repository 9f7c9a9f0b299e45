//! Session enrichment: device attributes from user agents and best-effort
//! geographic lookups.

mod device;
mod ip;
mod lookup;
pub mod plugin;

pub use device::resolve_device;
pub use ip::is_unroutable;
pub use lookup::{
    Coordinates, GeoError, GeoLookupService, MockGeoLookup, RemoteGeoLookup, IPINFO_BASE_URL,
    OPENCAGE_BASE_URL,
};
pub use plugin::GeoPlugin;
