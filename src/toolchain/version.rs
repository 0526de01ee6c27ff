//! Requested and published toolchain versions.

use super::ProvisionError;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRequest {
    Latest,
    Revision(u64),
}

impl FromStr for VersionRequest {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("latest") {
            return Ok(VersionRequest::Latest);
        }
        s.parse::<u64>().map(VersionRequest::Revision).map_err(|_| {
            ProvisionError::Configuration(format!(
                "invalid toolchain version '{}': expected \"latest\" or a revision number",
                s
            ))
        })
    }
}

impl fmt::Display for VersionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRequest::Latest => f.write_str("latest"),
            VersionRequest::Revision(r) => write!(f, "{}", r),
        }
    }
}

/// The `VERSION` document published next to every bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    #[serde(deserialize_with = "revision_number")]
    pub revision: u64,
    /// Build stamp, `yyyymmddhhss`.
    pub date: String,
}

impl VersionInfo {
    pub fn new(revision: u64, date: impl Into<String>) -> Self {
        Self {
            revision,
            date: date.into(),
        }
    }

    pub fn parse(body: &str) -> Result<Self, ProvisionError> {
        let info: VersionInfo = serde_json::from_str(body)
            .map_err(|e| ProvisionError::VersionDocument(e.to_string()))?;
        info.date_stamp()?;
        Ok(info)
    }

    pub fn date_stamp(&self) -> Result<u64, ProvisionError> {
        let date = self.date.trim();
        if date.len() != 12 || !date.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ProvisionError::VersionDocument(format!(
                "date '{}' is not a yyyymmddhhss stamp",
                self.date
            )));
        }
        date.parse::<u64>()
            .map_err(|e| ProvisionError::VersionDocument(e.to_string()))
    }

    /// A later revision or a later build date counts as newer. An install
    /// with no recorded date is only replaced by a later revision.
    pub fn is_newer_than(&self, installed_revision: u64, installed_date: &str) -> bool {
        if self.revision > installed_revision {
            return true;
        }
        let installed = VersionInfo::new(installed_revision, installed_date);
        match (self.date_stamp(), installed.date_stamp()) {
            (Ok(ours), Ok(theirs)) => ours > theirs,
            _ => false,
        }
    }
}

fn revision_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
