//! Static domain-equivalence data attached to sync snapshots.

use serde::Serialize;

/// One global equivalence class: domains that share saved logins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalDomain {
    #[serde(rename = "type")]
    pub domain_type: i32,
    pub domains: Vec<String>,
    pub excluded: bool,
}

/// The `domains` section of a sync snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Domains {
    pub equivalent_domains: Vec<Vec<String>>,
    pub global_equivalent_domains: Vec<GlobalDomain>,
    pub object: &'static str,
}

const GLOBAL_EQUIVALENT_DOMAINS: &[(i32, &[&str])] = &[
    (1, &["youtube.com", "google.com", "gmail.com"]),
    (2, &["apple.com", "icloud.com"]),
    (3, &["microsoft.com", "live.com", "outlook.com", "hotmail.com"]),
];

/// The fixed table served to every account.
#[must_use]
pub fn global_domains() -> Domains {
    Domains {
        equivalent_domains: Vec::new(),
        global_equivalent_domains: GLOBAL_EQUIVALENT_DOMAINS
            .iter()
            .map(|(domain_type, domains)| GlobalDomain {
                domain_type: *domain_type,
                domains: domains.iter().map(|d| (*d).to_owned()).collect(),
                excluded: false,
            })
            .collect(),
        object: "domains",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn google_class_is_type_one() {
        let domains = global_domains();
        let google = &domains.global_equivalent_domains[0];
        assert_eq!(google.domain_type, 1);
        assert!(google.domains.iter().any(|d| d == "gmail.com"));
        assert!(!google.excluded);
    }

    #[test]
    fn serializes_with_client_field_names() {
        let json = serde_json::to_value(global_domains()).unwrap();
        assert_eq!(json["object"], "domains");
        assert_eq!(json["equivalentDomains"], serde_json::json!([]));
        assert_eq!(json["globalEquivalentDomains"][0]["type"], 1);
    }
}
