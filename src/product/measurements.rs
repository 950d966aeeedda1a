use once_cell::sync::Lazy;
use regex::Regex;

const LENGTH_UNIT_TO_INCHES: &[(&str, f64)] = &[
    ("in", 1.0),
    ("inch", 1.0),
    ("inches", 1.0),
    ("\"", 1.0),
    ("ft", 12.0),
    ("foot", 12.0),
    ("feet", 12.0),
    ("cm", 0.3937007874),
    ("centimeter", 0.3937007874),
    ("centimeters", 0.3937007874),
    ("mm", 0.03937007874),
    ("millimeter", 0.03937007874),
    ("millimeters", 0.03937007874),
];

const WEIGHT_UNIT_TO_POUNDS: &[(&str, f64)] = &[
    ("lb", 1.0),
    ("lbs", 1.0),
    ("pound", 1.0),
    ("pounds", 1.0),
    ("kg", 2.20462262),
    ("kilogram", 2.20462262),
    ("kilograms", 2.20462262),
    ("g", 0.00220462262),
    ("gram", 0.00220462262),
    ("grams", 0.00220462262),
];

const OUNCE_UNITS: &[&str] = &["oz", "ounce", "ounces"];

static LENGTH_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(\d+(?:\.\d+)?)\s*(inches|inch|in\b|"|feet|foot|ft\b|centimeters|centimeter|cm\b|millimeters|millimeter|mm\b)?"#,
    )
    .expect("length token pattern")
});

static WEIGHT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*(pounds|pound|lbs|lb|ounces|ounce|oz|kilograms|kilogram|kg|grams|gram|g)?\b")
        .expect("weight token pattern")
});

/// Parse `L x W x H` text into inches.
///
/// Exactly three positive numbers must be present. A token without its own
/// unit borrows the last unit written anywhere in the text, and text with no
/// unit at all is read as inches.
pub fn parse_dimension_triple(text: &str) -> Option<[f64; 3]> {
    let tokens: Vec<(f64, Option<String>)> = LENGTH_TOKEN
        .captures_iter(text)
        .filter_map(|caps| {
            let number = caps.get(1)?.as_str().parse::<f64>().ok()?;
            let unit = caps.get(2).map(|m| m.as_str().to_lowercase());
            Some((number, unit))
        })
        .collect();
    if tokens.len() != 3 || tokens.iter().any(|(n, _)| *n <= 0.0) {
        return None;
    }
    let trailing_unit = tokens.iter().rev().find_map(|(_, unit)| unit.clone());
    let mut out = [0.0; 3];
    for (slot, (number, unit)) in out.iter_mut().zip(tokens) {
        let unit = unit.or_else(|| trailing_unit.clone());
        let factor = match unit.as_deref() {
            None => 1.0,
            Some(code) => length_factor(code)?,
        };
        *slot = round_two(number * factor);
    }
    Some(out)
}

/// Parse a weight token into pounds; ounces are divided by 16.
pub fn parse_weight_pounds(text: &str) -> Option<f64> {
    let caps = WEIGHT_TOKEN.captures(text)?;
    let number = caps.get(1)?.as_str().parse::<f64>().ok()?;
    if number <= 0.0 {
        return None;
    }
    let unit = caps.get(2).map(|m| m.as_str().to_lowercase());
    let pounds = match unit.as_deref() {
        None => number,
        Some(code) if OUNCE_UNITS.contains(&code) => number / 16.0,
        Some(code) => number * weight_factor(code)?,
    };
    Some(round_two(pounds))
}

fn length_factor(code: &str) -> Option<f64> {
    LENGTH_UNIT_TO_INCHES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(code))
        .map(|(_, factor)| *factor)
}

fn weight_factor(code: &str) -> Option<f64> {
    WEIGHT_UNIT_TO_POUNDS
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(code))
        .map(|(_, factor)| *factor)
}

pub fn round_two(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
