//! Static registry of authoritative medical sources, grouped by topic.
//!
//! Each topic maps to one vector-store collection of the same name. Entries
//! are configuration data only; nothing here performs IO.

use serde::{Deserialize, Serialize};

/// How much editorial trust we place in a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Credibility {
    High,
    Medium,
}

impl Credibility {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Credibility::High => "high",
            Credibility::Medium => "medium",
        }
    }
}

impl std::str::FromStr for Credibility {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Credibility::High),
            "medium" => Ok(Credibility::Medium),
            other => Err(format!("unknown credibility level: {other}")),
        }
    }
}

/// A single scrape target with its provenance metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub url: String,
    pub organization: String,
    pub category: String,
    pub credibility: Credibility,
    /// Date the link and organization were last manually verified (YYYY-MM-DD).
    pub last_verified: String,
}

/// A subject area: its collection name, the terms the validator expects to
/// see in on-topic content, and the sources to scrape.
#[derive(Debug, Clone)]
pub struct Topic {
    pub name: &'static str,
    pub terms: &'static [&'static str],
    pub sources: Vec<SourceEntry>,
}

/// The default topic used when a caller does not select one.
pub const DEFAULT_TOPIC: &str = "menopause";

fn entry(
    url: &str,
    organization: &str,
    category: &str,
    credibility: Credibility,
    last_verified: &str,
) -> SourceEntry {
    SourceEntry {
        url: url.to_string(),
        organization: organization.to_string(),
        category: category.to_string(),
        credibility,
        last_verified: last_verified.to_string(),
    }
}

fn menopause() -> Topic {
    Topic {
        name: "menopause",
        terms: &[
            "menopause",
            "perimenopause",
            "postmenopause",
            "hot flash",
            "hot flush",
            "hormone therapy",
            "estrogen",
            "night sweats",
            "vasomotor",
            "osteoporosis",
        ],
        sources: vec![
            entry(
                "https://menopause.org/patient-education/menopause-topics",
                "The Menopause Society",
                "professional-society",
                Credibility::High,
                "2025-06-14",
            ),
            entry(
                "https://www.acog.org/womens-health/faqs/the-menopause-years",
                "ACOG",
                "professional-society",
                Credibility::High,
                "2025-06-14",
            ),
            entry(
                "https://medlineplus.gov/menopause.html",
                "MedlinePlus/NIH",
                "government",
                Credibility::High,
                "2025-06-14",
            ),
            entry(
                "https://www.uclahealth.org/medical-services/obgyn/menopause",
                "UCLA Health",
                "academic-medical-center",
                Credibility::High,
                "2025-06-14",
            ),
            entry(
                "https://www.nia.nih.gov/health/menopause/what-menopause",
                "National Institute on Aging",
                "government",
                Credibility::High,
                "2025-06-14",
            ),
            entry(
                "https://www.mayoclinic.org/diseases-conditions/menopause/symptoms-causes/syc-20353397",
                "Mayo Clinic",
                "academic-medical-center",
                Credibility::High,
                "2025-06-14",
            ),
            entry(
                "https://www.womenshealth.gov/menopause",
                "Office on Women's Health",
                "government",
                Credibility::Medium,
                "2025-06-14",
            ),
        ],
    }
}

fn breast_cancer() -> Topic {
    Topic {
        name: "breast_cancer",
        terms: &[
            "breast cancer",
            "mammogram",
            "mammography",
            "tumor",
            "biopsy",
            "chemotherapy",
            "mastectomy",
            "lumpectomy",
            "metastatic",
            "her2",
            "screening",
        ],
        sources: vec![
            entry(
                "https://www.cancer.org/cancer/types/breast-cancer.html",
                "American Cancer Society",
                "nonprofit",
                Credibility::High,
                "2025-06-21",
            ),
            entry(
                "https://www.cdc.gov/breast-cancer/about/index.html",
                "CDC",
                "government",
                Credibility::High,
                "2025-06-21",
            ),
            entry(
                "https://www.breastcancer.org/facts-statistics",
                "Breastcancer.org",
                "nonprofit",
                Credibility::Medium,
                "2025-06-21",
            ),
            entry(
                "https://www.komen.org/breast-cancer/",
                "Susan G. Komen",
                "nonprofit",
                Credibility::Medium,
                "2025-06-21",
            ),
            entry(
                "https://medlineplus.gov/breastcancer.html",
                "MedlinePlus/NIH",
                "government",
                Credibility::High,
                "2025-06-21",
            ),
            entry(
                "https://www.mayoclinic.org/diseases-conditions/breast-cancer/symptoms-causes/syc-20352470",
                "Mayo Clinic",
                "academic-medical-center",
                Credibility::High,
                "2025-06-21",
            ),
        ],
    }
}

/// All registered topics.
#[inline]
pub fn all_topics() -> Vec<Topic> {
    vec![menopause(), breast_cancer()]
}

/// Look up a single topic by collection name.
#[inline]
pub fn topic(name: &str) -> Option<Topic> {
    all_topics().into_iter().find(|t| t.name == name)
}
