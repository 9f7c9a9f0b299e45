use beacon_entities::{DeviceProfile, DeviceType};
use woothee::parser::{Parser, WootheeResult};

/// Resolve device attributes from a raw user-agent header.
///
/// Unknown or empty agents resolve to a bare desktop profile.
pub fn resolve_device(user_agent: &str) -> DeviceProfile {
    if user_agent.trim().is_empty() {
        return DeviceProfile::default();
    }

    let parser = Parser::new();
    match parser.parse(user_agent) {
        Some(result) => from_woothee_result(&result, user_agent),
        None => DeviceProfile {
            device_type: device_type("", "", user_agent),
            ..DeviceProfile::default()
        },
    }
}

/// Model prefixes of Android handsets and the maker behind them
const ANDROID_MAKERS: &[(&str, &str)] = &[
    ("SM-", "Samsung"),
    ("GT-", "Samsung"),
    ("SAMSUNG", "Samsung"),
    ("Pixel", "Google"),
    ("Nexus", "Google"),
    ("Redmi", "Xiaomi"),
    ("POCO", "Xiaomi"),
    ("moto", "Motorola"),
    ("HUAWEI", "Huawei"),
    ("ONEPLUS", "OnePlus"),
    ("Nokia", "Nokia"),
];

fn from_woothee_result(result: &WootheeResult, user_agent: &str) -> DeviceProfile {
    let os_name = clean(result.os);
    let (vendor, model) = hardware(os_name.as_deref(), user_agent);

    DeviceProfile {
        device_type: device_type(result.category, result.os, user_agent),
        os_name,
        os_version: clean(&result.os_version),
        browser_name: clean(result.name),
        browser_version: clean(result.version),
        vendor,
        model,
    }
}

/// Hardware maker and model. Desktops and unrecognized handsets have neither.
fn hardware(os_name: Option<&str>, user_agent: &str) -> (Option<String>, Option<String>) {
    if let Some(os) = os_name.filter(|os| matches!(*os, "iPhone" | "iPad" | "iPod")) {
        return (Some("Apple".to_string()), Some(os.to_string()));
    }

    let Some(model) = android_model(user_agent) else {
        return (None, None);
    };
    let vendor = ANDROID_MAKERS
        .iter()
        .find(|(prefix, _)| model.starts_with(*prefix))
        .map(|(_, maker)| maker.to_string());
    (vendor, Some(model.to_string()))
}

/// The token after `Android <version>` in the platform section, without its
/// `Build/...` suffix. Reduced agents send a bare `K` there.
fn android_model(user_agent: &str) -> Option<&str> {
    let start = user_agent.find('(')? + 1;
    let end = start + user_agent[start..].find(')')?;
    let mut tokens = user_agent[start..end].split(';').map(str::trim);

    tokens.find(|token| token.starts_with("Android"))?;
    let model = tokens.next()?;
    let model = model.split(" Build/").next().unwrap_or(model).trim();
    (!model.is_empty() && model != "K" && model != "wv").then_some(model)
}

fn device_type(category: &str, os: &str, user_agent: &str) -> DeviceType {
    if os == "iPad" || user_agent.contains("iPad") {
        return DeviceType::Tablet;
    }
    if user_agent.contains("Android") && !user_agent.contains("Mobile") {
        return DeviceType::Tablet;
    }

    match category {
        "smartphone" | "mobilephone" => DeviceType::Mobile,
        _ => DeviceType::Desktop,
    }
}

fn clean(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}
