use beacon_database::{CampaignKey, DIRECT_SOURCE, NO_CAMPAIGN};
use serde::Deserialize;
use utoipa::IntoParams;

/// Campaign selector; missing values select the defaulted buckets
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CampaignDetailQuery {
    /// Traffic source, `direct` when omitted
    pub source: Option<String>,
    /// Campaign name, `(none)` when omitted
    pub campaign: Option<String>,
}

impl CampaignDetailQuery {
    pub fn key(&self) -> CampaignKey {
        CampaignKey::new(
            self.source.as_deref().unwrap_or(DIRECT_SOURCE),
            self.campaign.as_deref().unwrap_or(NO_CAMPAIGN),
        )
    }
}
