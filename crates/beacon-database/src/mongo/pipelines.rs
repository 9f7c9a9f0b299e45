//! Aggregation pipeline builders for the session and variant collections

use bson::{doc, Bson, Document};

use crate::queries::{
    CampaignKey, Grouping, DIRECT_SOURCE, NO_CAMPAIGN, UNKNOWN_DEVICE, UNKNOWN_LOCATION,
};

const CTA_CLICK: &str = "CTA_Click";
const SECTION_TIME: &str = "SectionTime";

/// Defaulted `source` and `campaign` fields
fn campaign_fields() -> Document {
    doc! {
        "source": { "$ifNull": ["$utm_source", DIRECT_SOURCE] },
        "campaign": { "$ifNull": ["$utm_campaign", NO_CAMPAIGN] },
    }
}

fn scope_match(key: &CampaignKey) -> Document {
    doc! {
        "$match": {
            "source": key.source.as_str(),
            "campaign": key.campaign.as_str(),
        }
    }
}

fn scope_stages(scope: Option<&CampaignKey>) -> Vec<Document> {
    match scope {
        Some(key) => vec![doc! { "$addFields": campaign_fields() }, scope_match(key)],
        None => Vec::new(),
    }
}

/// Number of distinct non-empty values in an `$addToSet` array
fn non_empty_count(set_field: &str) -> Bson {
    Bson::Document(doc! {
        "$size": {
            "$filter": {
                "input": set_field,
                "as": "ip",
                "cond": { "$and": [
                    { "$ne": ["$$ip", Bson::Null] },
                    { "$ne": ["$$ip", ""] },
                ] },
            }
        }
    })
}

fn actions_matching(cond: Document) -> Document {
    doc! {
        "$filter": {
            "input": { "$ifNull": ["$actions", []] },
            "as": "a",
            "cond": cond,
        }
    }
}

fn cta_click_count() -> Document {
    doc! {
        "$size": actions_matching(doc! { "$eq": ["$$a.event", CTA_CLICK] })
    }
}

fn time_sum(section: Option<&str>) -> Document {
    let mut conditions = vec![Bson::Document(doc! { "$eq": ["$$a.event", SECTION_TIME] })];
    if let Some(section) = section {
        conditions.push(Bson::Document(doc! { "$eq": ["$$a.section", section] }));
    }

    doc! {
        "$sum": {
            "$map": {
                "input": actions_matching(doc! { "$and": conditions }),
                "as": "t",
                "in": { "$ifNull": ["$$t.timeSpent", 0] },
            }
        }
    }
}

pub fn cta_clicks() -> Vec<Document> {
    vec![
        doc! { "$unwind": "$actions" },
        doc! { "$match": { "actions.event": CTA_CLICK } },
        doc! { "$count": "count" },
    ]
}

pub fn average_time_by_section() -> Vec<Document> {
    vec![
        doc! { "$unwind": "$actions" },
        doc! { "$match": { "actions.event": SECTION_TIME } },
        doc! { "$group": {
            "_id": "$actions.section",
            "total": { "$sum": { "$ifNull": ["$actions.timeSpent", 0] } },
            "n": { "$sum": 1 },
        } },
        doc! { "$project": {
            "_id": 0,
            "section": "$_id",
            "avgSeconds": { "$divide": ["$total", "$n"] },
        } },
        doc! { "$sort": { "section": 1 } },
    ]
}

/// Count of sessions per value of `field`, missing values reported as `fallback`
pub fn breakdown(field: &str, fallback: &str, scope: Option<&CampaignKey>) -> Vec<Document> {
    let mut pipeline = scope_stages(scope);
    pipeline.extend([
        doc! { "$group": {
            "_id": { "$ifNull": [format!("${field}"), fallback] },
            "count": { "$sum": 1 },
        } },
        doc! { "$project": { "_id": 0, "label": "$_id", "count": 1 } },
        doc! { "$sort": { "count": -1, "label": 1 } },
    ]);
    pipeline
}

pub fn device_breakdown(scope: Option<&CampaignKey>) -> Vec<Document> {
    breakdown("device", UNKNOWN_DEVICE, scope)
}

pub fn source_breakdown() -> Vec<Document> {
    breakdown("utm_source", DIRECT_SOURCE, None)
}

pub fn location_stats(scope: Option<&CampaignKey>, limit: Option<i64>) -> Vec<Document> {
    let mut pipeline = scope_stages(scope);
    pipeline.extend([
        doc! { "$group": {
            "_id": { "$ifNull": ["$location", UNKNOWN_LOCATION] },
            "sessions": { "$sum": 1 },
            "ips": { "$addToSet": "$ip" },
        } },
        doc! { "$project": {
            "_id": 0,
            "location": "$_id",
            "sessions": 1,
            "uniqueUsers": non_empty_count("$ips"),
        } },
        doc! { "$sort": { "sessions": -1, "location": 1 } },
    ]);
    if let Some(limit) = limit {
        pipeline.push(doc! { "$limit": limit });
    }
    pipeline
}

pub fn geo_points() -> Vec<Document> {
    vec![
        doc! { "$match": {
            "lat": { "$type": "number" },
            "lon": { "$type": "number" },
        } },
        doc! { "$group": {
            "_id": { "country": "$country", "city": "$city", "lat": "$lat", "lon": "$lon" },
            "sessions": { "$sum": 1 },
            "ips": { "$addToSet": "$ip" },
        } },
        doc! { "$project": {
            "_id": 0,
            "country": "$_id.country",
            "city": "$_id.city",
            "lat": "$_id.lat",
            "lon": "$_id.lon",
            "sessions": 1,
            "users": non_empty_count("$ips"),
        } },
        doc! { "$sort": { "sessions": -1 } },
    ]
}

pub fn recent_actions(limit: i64) -> Vec<Document> {
    vec![
        doc! { "$unwind": "$actions" },
        doc! { "$sort": { "actions.timestamp": -1 } },
        doc! { "$limit": limit },
        doc! { "$project": {
            "_id": 0,
            "sessionId": 1,
            "section": "$actions.section",
            "event": "$actions.event",
            "timeSpent": "$actions.timeSpent",
            "timestamp": "$actions.timestamp",
        } },
    ]
}

pub fn group_totals(grouping: Grouping, scope: Option<&CampaignKey>) -> Vec<Document> {
    let mut derived = campaign_fields();
    derived.insert("ctaClicks", cta_click_count());
    derived.insert("totalTime", time_sum(None));
    derived.insert("heroTime", time_sum(Some("hero")));
    derived.insert("servicesTime", time_sum(Some("services")));
    derived.insert("contactTime", time_sum(Some("contact")));

    let mut pipeline = vec![doc! { "$addFields": derived }];
    if let Some(key) = scope {
        pipeline.push(scope_match(key));
    }

    let group_id = match grouping {
        Grouping::SourceCampaign => Bson::Document(doc! {
            "source": "$source",
            "campaign": "$campaign",
        }),
        Grouping::Source => Bson::String("$source".to_string()),
        Grouping::Variant => Bson::String("$variantId".to_string()),
        Grouping::Overall => Bson::Null,
    };

    let mut projection = doc! {
        "_id": 0,
        "variantName": 1,
        "sessions": 1,
        "users": non_empty_count("$ips"),
        "ctaClicks": 1,
        "totalTime": 1,
        "heroTime": 1,
        "servicesTime": 1,
        "contactTime": 1,
    };
    match grouping {
        Grouping::SourceCampaign => {
            projection.insert("source", "$_id.source");
            projection.insert("campaign", "$_id.campaign");
        }
        Grouping::Source => {
            projection.insert("source", "$_id");
        }
        Grouping::Variant => {
            projection.insert("variantId", "$_id");
        }
        Grouping::Overall => {}
    }

    pipeline.extend([
        doc! { "$group": {
            "_id": group_id,
            "variantName": { "$first": "$variantName" },
            "sessions": { "$sum": 1 },
            "ips": { "$addToSet": "$ip" },
            "ctaClicks": { "$sum": "$ctaClicks" },
            "totalTime": { "$sum": "$totalTime" },
            "heroTime": { "$sum": "$heroTime" },
            "servicesTime": { "$sum": "$servicesTime" },
            "contactTime": { "$sum": "$contactTime" },
        } },
        doc! { "$project": projection },
        doc! { "$sort": { "sessions": -1, "ctaClicks": -1 } },
    ]);
    pipeline
}

/// Active variants that can still take a random impression
pub fn under_cap_filter() -> Document {
    doc! {
        "active": true,
        "$expr": { "$lt": ["$impressions", "$showCap"] },
    }
}

pub fn eligible_sample() -> Vec<Document> {
    vec![
        doc! { "$match": under_cap_filter() },
        doc! { "$sample": { "size": 1 } },
        doc! { "$project": { "_id": 1 } },
    ]
}
