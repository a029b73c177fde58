use super::domain::ProviderCategory;

/// Canonical form used on both sides of a credential comparison.
///
/// Values are trimmed, upper-cased and have inner whitespace collapsed. Telco and membership
/// names then go through an alias table, so `SK텔레콤` and `skt` both become `SKT`. Card and
/// affiliation names keep their product wording.
pub fn normalize_credential(category: ProviderCategory, raw: &str) -> String {
    let collapsed = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase();
    let compact: String = collapsed.chars().filter(|c| !c.is_whitespace()).collect();

    let alias = match category {
        ProviderCategory::Telco => telco_alias(&compact),
        ProviderCategory::Membership => membership_alias(&compact),
        ProviderCategory::Payment | ProviderCategory::Affiliation => None,
    };
    alias.map_or(collapsed, str::to_string)
}

fn telco_alias(compact: &str) -> Option<&'static str> {
    match compact {
        "SKT" | "SK텔레콤" | "SKTELECOM" | "에스케이티" | "에스케이텔레콤" => Some("SKT"),
        "KT" | "케이티" | "케이티텔레콤" => Some("KT"),
        "LGU+" | "LGUPLUS" | "LG유플러스" | "엘지유플러스" | "LGU플러스" => Some("LG U+"),
        _ => None,
    }
}

fn membership_alias(compact: &str) -> Option<&'static str> {
    match compact {
        "CJONE" | "씨제이원" => Some("CJ ONE"),
        "L.POINT" | "LPOINT" | "L포인트" | "엘포인트" => Some("L.POINT"),
        "HAPPYPOINT" | "해피포인트" => Some("HAPPY POINT"),
        "OKCASHBAG" | "OK캐쉬백" => Some("OK CASHBAG"),
        "SHINSEGAEPOINT" | "신세계포인트" => Some("SHINSEGAE POINT"),
        _ => None,
    }
}
