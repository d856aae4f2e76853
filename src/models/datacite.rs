//! Publication metadata in DataCite form

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// DOI recorded until the service assigns a real one
pub const PLACEHOLDER_DOI: &str = "10.YET/UNASSIGNED";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    pub creator_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affiliations: Vec<String>,
}

impl Creator {
    /// Parse a name written as "Family, Given" or "Given Family"
    pub fn from_name(name: &str, affiliations: Vec<String>) -> Self {
        let (given, family) = match name.split_once(',') {
            Some((family, given)) => (given.trim().to_string(), family.trim().to_string()),
            None => match name.trim().rsplit_once(' ') {
                Some((given, family)) => (given.trim().to_string(), family.trim().to_string()),
                None => (String::new(), name.trim().to_string()),
            },
        };

        let creator_name = if given.is_empty() {
            family.clone()
        } else {
            format!("{}, {}", family, given)
        };

        Self {
            creator_name,
            given_name: (!given.is_empty()).then_some(given),
            family_name: Some(family),
            affiliations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceType {
    pub resource_type_general: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub identifier: String,
    pub identifier_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Description {
    pub description: String,
    pub description_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FundingReference {
    pub funder_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub award_number: Option<AwardNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub award_title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwardNumber {
    pub award_number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelatedIdentifier {
    pub related_identifier: String,
    pub related_identifier_type: String,
    pub relation_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateIdentifier {
    pub alternate_identifier: String,
    pub alternate_identifier_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rights {
    pub rights: String,
    #[serde(rename = "rightsURI", default, skip_serializing_if = "Option::is_none")]
    pub rights_uri: Option<String>,
}

/// The `datacite` section of a DLHub document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datacite {
    pub creators: Vec<Creator>,
    pub titles: Vec<Title>,
    pub publisher: String,
    pub resource_type: ResourceType,
    pub identifier: Identifier,
    pub publication_year: String,
    pub descriptions: Vec<Description>,
    pub funding_references: Vec<FundingReference>,
    pub related_identifiers: Vec<RelatedIdentifier>,
    pub alternate_identifiers: Vec<AlternateIdentifier>,
    pub rights_list: Vec<Rights>,
}

impl Default for Datacite {
    fn default() -> Self {
        Self {
            creators: Vec::new(),
            titles: Vec::new(),
            publisher: "DLHub".to_string(),
            resource_type: ResourceType {
                resource_type_general: "InteractiveResource".to_string(),
            },
            identifier: Identifier {
                identifier: PLACEHOLDER_DOI.to_string(),
                identifier_type: "DOI".to_string(),
            },
            publication_year: chrono::Utc::now().year().to_string(),
            descriptions: Vec::new(),
            funding_references: Vec::new(),
            related_identifiers: Vec::new(),
            alternate_identifiers: Vec::new(),
            rights_list: Vec::new(),
        }
    }
}

impl Datacite {
    pub fn set_title(&mut self, title: &str) {
        self.titles = vec![Title {
            title: title.to_string(),
        }];
    }

    pub fn set_authors(&mut self, authors: &[&str], affiliations: &[Vec<String>]) {
        self.creators = authors
            .iter()
            .enumerate()
            .map(|(i, name)| Creator::from_name(name, affiliations.get(i).cloned().unwrap_or_default()))
            .collect();
    }

    /// Replace the abstract, keeping any other descriptions
    pub fn set_abstract(&mut self, text: &str) {
        self.descriptions
            .retain(|d| d.description_type != "Abstract");
        self.descriptions.push(Description {
            description: text.to_string(),
            description_type: "Abstract".to_string(),
        });
    }
}
