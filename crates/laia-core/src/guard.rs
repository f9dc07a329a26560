//! Risk-gated mutation of an in-memory settings document.

use crate::config::{ConfigStore, SettingField, SettingValue, SettingsDocument};
use crate::error::{LaiaError, LaiaResult};
use crate::risk::{self, RiskEntry};
use log::{info, warn};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Result of a proposed change. Both variants carry the catalog entry so the
/// caller can show the rationale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    Applied(RiskEntry),
    /// Confirmation was declined; the document is unchanged.
    Rejected(RiskEntry),
}

impl Proposal {
    pub fn entry(&self) -> &RiskEntry {
        match self {
            Proposal::Applied(entry) | Proposal::Rejected(entry) => entry,
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Proposal::Applied(_))
    }
}

/// Sole writer of a [`SettingsDocument`] between load and save.
#[derive(Debug, Default)]
pub struct GuardedMutator {
    document: Mutex<SettingsDocument>,
    pending: Mutex<HashSet<SettingField>>,
    dirty: AtomicBool,
}

impl GuardedMutator {
    pub fn new(document: SettingsDocument) -> Self {
        Self {
            document: Mutex::new(document),
            pending: Mutex::new(HashSet::new()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Apply `value` to `field`, asking `confirm` first when the change is danger tier.
    ///
    /// `confirm` runs at most once and without any internal lock held, so it
    /// may block on a dialog or prompt. While it runs, any further proposal
    /// for the same field fails with [`LaiaError::ConfirmationPending`],
    /// whatever its tier.
    pub fn propose<F>(
        &self,
        field: SettingField,
        value: SettingValue,
        confirm: F,
    ) -> LaiaResult<Proposal>
    where
        F: FnOnce(&RiskEntry) -> bool,
    {
        if !field.accepts(&value) {
            return Err(LaiaError::InvalidValue {
                field: field.path().to_string(),
                value: value.to_string(),
                reason: "value kind does not match the field".into(),
            });
        }

        // Held for every tier, so a field with an open confirmation refuses
        // all other writes until that confirmation resolves.
        let _pending = PendingConfirmation::claim(&self.pending, field)?;
        let entry = risk::classify(field, &value);
        if !entry.tier.requires_confirmation() {
            self.apply(field, value.clone())?;
            info!("{field} set to {value} ({})", entry.tier);
            return Ok(Proposal::Applied(entry));
        }

        if confirm(&entry) {
            self.apply(field, value.clone())?;
            warn!("{field} set to {value} after confirmation ({})", entry.tier);
            Ok(Proposal::Applied(entry))
        } else {
            info!("change of {field} to {value} declined; value kept");
            Ok(Proposal::Rejected(entry))
        }
    }

    pub fn get(&self, field: SettingField) -> SettingValue {
        self.lock_document().get(field)
    }

    /// Snapshot of the current document.
    pub fn document(&self) -> SettingsDocument {
        self.lock_document().clone()
    }

    pub fn into_document(self) -> SettingsDocument {
        self.document
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True once any change has been applied since construction or the last save.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Persist the current document through `store`.
    pub fn save(&self, store: &ConfigStore) -> LaiaResult<()> {
        let snapshot = self.document();
        store.save(&snapshot)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn apply(&self, field: SettingField, value: SettingValue) -> LaiaResult<()> {
        let mut document = self.lock_document();
        if document.get(field) != value {
            document.set(field, value)?;
            self.dirty.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn lock_document(&self) -> MutexGuard<'_, SettingsDocument> {
        self.document
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Marks a field as awaiting confirmation until dropped.
struct PendingConfirmation<'a> {
    pending: &'a Mutex<HashSet<SettingField>>,
    field: SettingField,
}

impl<'a> PendingConfirmation<'a> {
    fn claim(pending: &'a Mutex<HashSet<SettingField>>, field: SettingField) -> LaiaResult<Self> {
        let mut set = pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !set.insert(field) {
            return Err(LaiaError::ConfirmationPending(field.path().to_string()));
        }
        Ok(Self { pending, field })
    }
}

impl Drop for PendingConfirmation<'_> {
    fn drop(&mut self) {
        let mut set = self
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        set.remove(&self.field);
    }
}
