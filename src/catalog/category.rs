/// Keyword rules, checked in order; the first match wins.
const RULES: &[(&str, &[&str])] = &[
    ("Seating", &["scaun", "chair", "fotoliu", "sofa", "canapea", "taburet", "banca"]),
    ("Tables", &["masa", "table", "birou", "desk", "consola"]),
    (
        "Storage",
        &["dulap", "comoda", "raft", "shelf", "kallax", "pax", "biblioteca", "sertar"],
    ),
    ("Beds", &["pat", "bed", "saltea", "mattress", "somiera"]),
    ("Office", &["markus", "micke", "alex", "office", "birou", "lampă birou"]),
    ("Lighting", &["lampa", "lamp", "aplica", "lustra", "bec", "light"]),
];

pub const FALLBACK_CATEGORY: &str = "Other";

/// Coarse category for a listing title, by substring match on the lowercased
/// title.
pub fn infer_category(title: &str) -> &'static str {
    let title = title.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| title.contains(k)))
        .map(|(category, _)| *category)
        .unwrap_or(FALLBACK_CATEGORY)
}
