use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::Path;
use tracing::info;

pub const SERVICES_FILE_NAME: &str = "website-services.json";
pub const NAVIGATION_FILE_NAME: &str = "website-navigation.json";

/// One offering of the company, as published on the website.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: String,
}

/// A named navigation target resolving to an absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationSection {
    pub id: i64,
    pub section: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Wire shape of a successful navigation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNotFound {
    pub section: String,
}

impl Display for SectionNotFound {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "no navigation section named '{}'", self.section)
    }
}

impl Error for SectionNotFound {}

/// The two fixed collections, loaded once at startup and immutable thereafter.
/// Restarting the process is the only way to pick up data changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebsiteData {
    services: Vec<Service>,
    navigation: Vec<NavigationSection>,
}

#[derive(Debug, Deserialize)]
struct ServicesDocument {
    services: Vec<Service>,
}

#[derive(Debug, Deserialize)]
struct NavigationDocument {
    navigation: Vec<NavigationSection>,
}

impl WebsiteData {
    pub fn load(data_dir: &Path) -> Result<Self> {
        let services: ServicesDocument = load_document(&data_dir.join(SERVICES_FILE_NAME))?;
        let navigation: NavigationDocument = load_document(&data_dir.join(NAVIGATION_FILE_NAME))?;
        let data = Self::from_parts(services.services, navigation.navigation)?;
        info!(
            services = data.services.len(),
            sections = data.navigation.len(),
            "loaded website data from {}",
            data_dir.display()
        );
        Ok(data)
    }

    pub fn from_parts(
        services: Vec<Service>,
        navigation: Vec<NavigationSection>,
    ) -> Result<Self> {
        let mut seen_sections = HashSet::new();
        for entry in &navigation {
            if !seen_sections.insert(entry.section.as_str()) {
                bail!(
                    "Invalid navigation data: duplicate section key '{}'",
                    entry.section
                );
            }
        }

        let mut seen_ids = HashSet::new();
        for service in &services {
            if !seen_ids.insert(service.id) {
                bail!("Invalid services data: duplicate service id {}", service.id);
            }
        }

        Ok(Self {
            services,
            navigation,
        })
    }

    /// The full collection, in document order. Never fails; empty is valid.
    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Case-sensitive exact match against the section key. Keys are unique, so
    /// a hit resolves to exactly one URL; a miss is an explicit error, never a
    /// silent default.
    pub fn resolve_section(&self, key: &str) -> Result<&NavigationSection, SectionNotFound> {
        self.navigation
            .iter()
            .find(|entry| entry.section == key)
            .ok_or_else(|| SectionNotFound {
                section: key.to_string(),
            })
    }
}

fn load_document<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path).map_err(|err| {
        anyhow!(
            "Failed to load website data {}: unable to read file: {err}",
            path.display()
        )
    })?;

    serde_json::from_str(&text)
        .map_err(|err| anyhow!("Failed to load website data {}: {err}", path.display()))
}
