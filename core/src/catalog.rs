//! The client-side catalog: app name to (snapshot, state).

use std::collections::HashMap;

use catalog_types::{App, AppState, derive_state};

/// One app as currently known to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub app: App,
    pub state: AppState,
}

impl CatalogEntry {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.app.name
    }

    /// URL to open, only while the app is confirmed running.
    #[must_use]
    pub fn launch_url(&self) -> Option<&str> {
        match self.state {
            AppState::On => self.app.url.as_deref(),
            AppState::Off | AppState::Loading => None,
        }
    }
}

/// Ordered map from app name to [`CatalogEntry`].
///
/// Entries keep the order the backend listed them in; names first seen
/// through a fold are appended. The revision counter is bumped on every
/// mutation that changes something and only then, so it doubles as a cheap
/// change detector for observers.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    index: HashMap<String, usize>,
    revision: u64,
}

impl Catalog {
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    #[inline]
    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    #[must_use]
    pub fn state(&self, name: &str) -> Option<AppState> {
        self.get(name).map(|entry| entry.state)
    }

    #[must_use]
    pub fn has_loading(&self) -> bool {
        self.entries.iter().any(|entry| entry.state.is_loading())
    }

    /// Names of every app currently in [`AppState::Loading`], in catalog order.
    #[must_use]
    pub fn loading_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.state.is_loading())
            .map(|entry| entry.app.name.clone())
            .collect()
    }

    /// Replace every entry, deriving each state from its snapshot.
    ///
    /// A name listed twice keeps its first position and its last snapshot.
    pub fn replace_all(&mut self, apps: Vec<App>) {
        let mut next = Catalog {
            revision: self.revision,
            ..Catalog::default()
        };
        for app in apps {
            let state = derive_state(&app);
            let name = app.name.clone();
            next.insert_or_replace(&name, CatalogEntry { app, state });
        }

        if next.entries != self.entries {
            self.entries = next.entries;
            self.index = next.index;
            self.bump();
        }
    }

    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.index.clear();
        self.bump();
    }

    /// Store `app` under `name` with `state`, inserting when absent.
    ///
    /// Returns whether anything observable changed.
    pub fn upsert(&mut self, name: &str, app: App, state: AppState) -> bool {
        let entry = CatalogEntry { app, state };
        if self.get(name) == Some(&entry) {
            return false;
        }
        self.insert_or_replace(name, entry);
        self.bump();
        true
    }

    /// Set only the state of `name`, keeping its snapshot.
    ///
    /// An unknown name gets a bare placeholder snapshot. Returns whether
    /// anything observable changed.
    pub fn set_state(&mut self, name: &str, state: AppState) -> bool {
        match self.index.get(name) {
            Some(&i) if self.entries[i].state == state => false,
            Some(&i) => {
                self.entries[i].state = state;
                self.bump();
                true
            }
            None => {
                self.insert_or_replace(name, CatalogEntry {
                    app: App::named(name),
                    state,
                });
                self.bump();
                true
            }
        }
    }

    fn insert_or_replace(&mut self, name: &str, entry: CatalogEntry) {
        match self.index.get(name) {
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    #[inline]
    fn bump(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

impl<'a> IntoIterator for &'a Catalog {
    type Item = &'a CatalogEntry;
    type IntoIter = std::slice::Iter<'a, CatalogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
