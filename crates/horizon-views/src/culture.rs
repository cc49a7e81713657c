//! Culture-aware text comparison.
//!
//! With the `localization` feature (on by default) comparisons go through an
//! ICU4X collator for the culture's locale. Without it, or when no collation
//! data exists for a locale, text compares case-insensitively with an ordinal
//! tie-break.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;
#[cfg(feature = "localization")]
use std::sync::Arc;

use regex::Regex;

use crate::error::{Result, ViewError};

/// Name of the invariant culture.
pub const INVARIANT: &str = "und";

static LOCALE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z]{2,8}(?:[-_][A-Za-z0-9]{1,8})*$").expect("culture name pattern is valid")
});

#[cfg(feature = "localization")]
type Collator = icu::collator::CollatorBorrowed<'static>;

/// A locale used to compare text keys.
#[derive(Clone)]
pub struct Culture {
    name: String,
    #[cfg(feature = "localization")]
    collator: Option<Arc<Collator>>,
}

impl Culture {
    /// Create a culture from a BCP 47 identifier such as `"en-US"` or `"sv-SE"`.
    ///
    /// Returns a configuration error if the identifier is malformed.
    pub fn new(name: &str) -> Result<Self> {
        if !LOCALE_PATTERN.is_match(name) {
            return Err(ViewError::configuration(format!("invalid culture name '{name}'")));
        }
        Self::from_valid_name(name)
    }

    #[cfg(feature = "localization")]
    fn from_valid_name(name: &str) -> Result<Self> {
        use icu::collator::Collator as IcuCollator;
        use icu::locale::Locale;

        let locale: Locale = name
            .parse()
            .map_err(|e| ViewError::configuration(format!("invalid culture name '{name}': {e}")))?;
        let collator = match IcuCollator::try_new(locale.clone().into(), Default::default()) {
            Ok(collator) => Some(Arc::new(collator)),
            Err(e) => {
                tracing::warn!(
                    target: horizon_views_core::logging::targets::PROJECTION,
                    culture = name,
                    error = %e,
                    "no collation data for culture, using case-insensitive comparison"
                );
                None
            }
        };
        Ok(Self {
            name: locale.to_string(),
            collator,
        })
    }

    #[cfg(not(feature = "localization"))]
    fn from_valid_name(name: &str) -> Result<Self> {
        Ok(Self {
            name: name.replace('_', "-"),
        })
    }

    /// The invariant culture.
    pub fn invariant() -> Self {
        Self::new(INVARIANT).unwrap_or_else(|_| Self::bare(INVARIANT))
    }

    /// The culture of the running system, or the invariant culture if it
    /// cannot be determined.
    pub fn system() -> Self {
        Self::new(&system_locale_name()).unwrap_or_else(|_| Self::invariant())
    }

    fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            #[cfg(feature = "localization")]
            collator: None,
        }
    }

    /// The normalized identifier of this culture.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compare two strings under this culture.
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        #[cfg(feature = "localization")]
        if let Some(collator) = &self.collator {
            return collator.compare(a, b).then_with(|| a.cmp(b));
        }
        compare_case_insensitive(a, b)
    }
}

fn compare_case_insensitive(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

#[cfg(feature = "localization")]
fn system_locale_name() -> String {
    sys_locale::get_locale().unwrap_or_else(|| "en-US".to_string())
}

#[cfg(not(feature = "localization"))]
fn system_locale_name() -> String {
    INVARIANT.to_string()
}

impl Default for Culture {
    fn default() -> Self {
        Self::invariant()
    }
}

impl PartialEq for Culture {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Culture").field(&self.name).finish()
    }
}

static_assertions::assert_impl_all!(Culture: Send, Sync, Clone);
