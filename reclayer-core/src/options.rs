//! Option services backing enumerated field types.
//!
//! An [`OptionsType`](crate::types::OptionsType) field delegates its allowed
//! value set to an [`OptionService`] on every validate/encode call — the set
//! is dynamic and never cached by the field type.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::RecordStoreResult;

/// A single selectable option with a unique name and a display name.
///
/// Field values store the `unique_name`; the `display_name` is for
/// presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    /// Case-sensitive identifier stored in the field.
    #[serde(rename = "uniqueName")]
    pub unique_name: String,
    /// Human-readable label.
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl SelectOption {
    /// Creates a new option.
    pub fn new(unique_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            unique_name: unique_name.into(),
            display_name: display_name.into(),
        }
    }
}

/// Source of the allowed value set for an enumerated field.
///
/// Implementations may be backed by anything — a database table, a remote
/// service, a static list. Failures propagate as
/// [`RecordStoreError::Options`](crate::error::RecordStoreError::Options)
/// from the field type.
pub trait OptionService: Send + Sync + Debug {
    /// Returns the full current option set.
    fn options(&self) -> RecordStoreResult<Vec<SelectOption>>;
}

/// An in-memory, lock-guarded [`OptionService`].
///
/// Useful for tests and static option sets. Duplicate additions (same
/// `unique_name`) are silently ignored, mirroring the schema builder's
/// first-registration-wins policy.
#[derive(Debug, Default)]
pub struct InMemoryOptionService {
    options: RwLock<Vec<SelectOption>>,
}

impl InMemoryOptionService {
    /// Creates a service seeded with the given options.
    pub fn new(options: Vec<SelectOption>) -> Self {
        Self { options: RwLock::new(options) }
    }

    // The guarded Vec is valid in any state a panicking writer can leave
    // it in, so a poisoned lock is recovered rather than surfaced.
    fn read(&self) -> RwLockReadGuard<'_, Vec<SelectOption>> {
        self.options.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<SelectOption>> {
        self.options.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an option; a duplicate `unique_name` is ignored.
    pub fn add_option(&self, option: SelectOption) {
        let mut options = self.write();
        if options
            .iter()
            .any(|o| o.unique_name == option.unique_name)
        {
            return;
        }
        options.push(option);
    }

    /// Removes the option with the given unique name; returns whether one
    /// was removed.
    pub fn remove_option(&self, unique_name: &str) -> bool {
        let mut options = self.write();
        let before = options.len();
        options.retain(|o| o.unique_name != unique_name);
        options.len() != before
    }

    /// Replaces the option with a matching unique name; returns whether one
    /// was updated.
    pub fn update_option(&self, option: SelectOption) -> bool {
        let mut options = self.write();
        for existing in options.iter_mut() {
            if existing.unique_name == option.unique_name {
                *existing = option;
                return true;
            }
        }
        false
    }

    /// Looks an option up by its unique name.
    pub fn option_by_unique_name(&self, unique_name: &str) -> Option<SelectOption> {
        self.read()
            .iter()
            .find(|o| o.unique_name == unique_name)
            .cloned()
    }

    /// Looks an option up by its display name.
    pub fn option_by_display_name(&self, display_name: &str) -> Option<SelectOption> {
        self.read()
            .iter()
            .find(|o| o.display_name == display_name)
            .cloned()
    }

    /// Whether an option with the given unique name exists.
    pub fn has_option(&self, unique_name: &str) -> bool {
        self.option_by_unique_name(unique_name).is_some()
    }

    /// Number of options currently held.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the service holds no options.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes all options.
    pub fn clear(&self) {
        self.write().clear();
    }
}

impl OptionService for InMemoryOptionService {
    fn options(&self) -> RecordStoreResult<Vec<SelectOption>> {
        Ok(self.read().clone())
    }
}
