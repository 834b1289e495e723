/// Recognized countries as (`keyword`, `canonical`) pairs. Keywords are
/// lowercase and include accent-less spellings so matching can stay a plain
/// substring scan over normalized text.
pub const KNOWN_COUNTRIES: &[(&str, &str)] = &[
    ("ecuador", "Ecuador"),
    ("colombia", "Colombia"),
    ("perú", "Perú"),
    ("peru", "Perú"),
    ("méxico", "México"),
    ("mexico", "México"),
    ("argentina", "Argentina"),
    ("chile", "Chile"),
    ("venezuela", "Venezuela"),
    ("bolivia", "Bolivia"),
    ("uruguay", "Uruguay"),
    ("paraguay", "Paraguay"),
    ("españa", "España"),
    ("espana", "España"),
    ("guatemala", "Guatemala"),
    ("honduras", "Honduras"),
    ("el salvador", "El Salvador"),
    ("nicaragua", "Nicaragua"),
    ("costa rica", "Costa Rica"),
    ("panamá", "Panamá"),
    ("panama", "Panamá"),
    ("república dominicana", "República Dominicana"),
    ("republica dominicana", "República Dominicana"),
    ("puerto rico", "Puerto Rico"),
    ("estados unidos", "Estados Unidos"),
    ("eeuu", "Estados Unidos"),
];

pub fn country_flag(country: &str) -> &'static str {
    match country.trim().to_lowercase().as_str() {
        "ecuador" => "\u{1F1EA}\u{1F1E8}",
        "colombia" => "\u{1F1E8}\u{1F1F4}",
        "perú" | "peru" => "\u{1F1F5}\u{1F1EA}",
        "méxico" | "mexico" => "\u{1F1F2}\u{1F1FD}",
        "argentina" => "\u{1F1E6}\u{1F1F7}",
        "chile" => "\u{1F1E8}\u{1F1F1}",
        "venezuela" => "\u{1F1FB}\u{1F1EA}",
        "bolivia" => "\u{1F1E7}\u{1F1F4}",
        "uruguay" => "\u{1F1FA}\u{1F1FE}",
        "paraguay" => "\u{1F1F5}\u{1F1FE}",
        "españa" | "espana" => "\u{1F1EA}\u{1F1F8}",
        "guatemala" => "\u{1F1EC}\u{1F1F9}",
        "honduras" => "\u{1F1ED}\u{1F1F3}",
        "el salvador" => "\u{1F1F8}\u{1F1FB}",
        "nicaragua" => "\u{1F1F3}\u{1F1EE}",
        "costa rica" => "\u{1F1E8}\u{1F1F7}",
        "panamá" | "panama" => "\u{1F1F5}\u{1F1E6}",
        "república dominicana" | "republica dominicana" => "\u{1F1E9}\u{1F1F4}",
        "puerto rico" => "\u{1F1F5}\u{1F1F7}",
        "estados unidos" => "\u{1F1FA}\u{1F1F8}",
        _ => "\u{1F30D}",
    }
}
