//! Declarative view configuration.
//!
//! [`ViewSettings`] captures everything about a view that can be written
//! down: sort descriptions, property-based grouping levels, the custom
//! filter expression, the placeholder position, the culture and the
//! policies. Settings can be read from and written to TOML or JSON and are
//! applied to a view with [`CollectionView::apply_settings`], which
//! rebuilds the projection once.
//!
//! Filter predicates and key-extractor grouping levels are code, not data,
//! and are never part of the settings.
//!
//! # Example
//!
//! ```
//! use horizon_views::settings::ViewSettings;
//! use horizon_views::view::{PlaceholderPosition, SortDirection};
//!
//! let settings = ViewSettings::from_toml_str(r#"
//!     group_by = ["State"]
//!     placeholder = "at_end"
//!
//!     [[sort]]
//!     property = "Name"
//!     direction = "Descending"
//! "#).unwrap();
//!
//! assert_eq!(settings.sort[0].direction, SortDirection::Descending);
//! assert_eq!(settings.placeholder, PlaceholderPosition::AtEnd);
//! assert!(settings.custom_filter.is_none());
//! ```
//!
//! [`CollectionView::apply_settings`]: crate::view::CollectionView::apply_settings

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::view::{PlaceholderPosition, SortDescription};

/// Serializable view configuration.
///
/// Every field has a default, so a settings file only needs to name what
/// it changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Property paths to group by, outermost first.
    pub group_by: Vec<String>,
    /// Where the new-item placeholder is shown.
    pub placeholder: PlaceholderPosition,
    /// Culture name for text comparison, e.g. `"en-US"`. `None` keeps the
    /// view's culture.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub culture: Option<String>,
    /// Order by natural key when no sort description is set.
    pub natural_ordering: bool,
    /// Keep the current item across source resets.
    pub restore_current_on_reset: bool,
    /// Custom filter expression evaluated by the source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_filter: Option<String>,
    /// Sort descriptions, primary first.
    pub sort: Vec<SortDescription>,
}

impl ViewSettings {
    /// Parses settings from TOML.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(toml_de_error)
    }

    /// Parses settings from JSON.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(json_error)
    }

    /// Serializes the settings as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(toml_ser_error)
    }

    /// Serializes the settings as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(json_error)
    }

    /// Reads settings from a `.toml` or `.json` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ViewError::configuration(format!("cannot read '{}': {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("json") => Self::from_json_str(&text),
            _ => Err(ViewError::configuration(format!(
                "unsupported settings format '{}'",
                path.display()
            ))),
        }
    }
}

fn toml_de_error(e: toml::de::Error) -> ViewError {
    ViewError::configuration(format!("invalid TOML settings: {}", e.message()))
}

fn toml_ser_error(e: toml::ser::Error) -> ViewError {
    ViewError::configuration(format!("cannot write TOML settings: {e}"))
}

fn json_error(e: serde_json::Error) -> ViewError {
    ViewError::configuration(format!("invalid JSON settings: {e}"))
}
