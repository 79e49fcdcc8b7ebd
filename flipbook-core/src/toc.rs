use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TocError;
use crate::PageIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub page: PageIndex,
}

/// Sections as read from `{"sections": [{"title": ..., "page": ...}]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableOfContents {
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl TableOfContents {
    pub fn from_sections(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub fn from_json(raw: &str) -> Result<Self, TocError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn load(path: &Path) -> Result<Self, TocError> {
        let raw = fs::read_to_string(path).map_err(|source| TocError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// The section `page` belongs to: the last one starting at or before it.
    pub fn section_for(&self, page: PageIndex) -> Option<&Section> {
        self.sections
            .iter()
            .filter(|section| section.page <= page)
            .max_by_key(|section| section.page)
    }

    pub fn next_after(&self, page: PageIndex) -> Option<&Section> {
        self.sections
            .iter()
            .filter(|section| section.page > page)
            .min_by_key(|section| section.page)
    }

    pub fn previous_before(&self, page: PageIndex) -> Option<&Section> {
        self.sections
            .iter()
            .filter(|section| section.page < page)
            .max_by_key(|section| section.page)
    }
}
