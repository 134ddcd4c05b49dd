//! Package mapping between revenue bundle ids and spend store ids
//!
//! AppLovin reports apps by bundle id (`com.example.app`), Mintegral by
//! App Store id (`id739067593`). The mapping is configuration data and is
//! passed explicitly to whatever needs it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One tracked app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppEntry {
    pub bundle_id: String,
    pub store_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl AppEntry {
    pub fn new(bundle_id: &str, store_id: &str, name: Option<&str>) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            store_id: store_id.to_string(),
            name: name.map(String::from),
        }
    }
}

/// Bidirectional bundle id / store id lookup
#[derive(Debug, Clone, Default)]
pub struct PackageMapping {
    apps: Vec<AppEntry>,
    by_store: HashMap<String, usize>,
    by_bundle: HashMap<String, usize>,
}

impl PackageMapping {
    /// Build from entries. Later entries win on duplicate ids.
    pub fn new(apps: Vec<AppEntry>) -> Self {
        let mut by_store = HashMap::with_capacity(apps.len());
        let mut by_bundle = HashMap::with_capacity(apps.len());
        for (idx, app) in apps.iter().enumerate() {
            by_store.insert(app.store_id.clone(), idx);
            by_bundle.insert(app.bundle_id.clone(), idx);
        }
        Self {
            apps,
            by_store,
            by_bundle,
        }
    }

    /// Build from `(bundle_id, store_id)` pairs
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self::new(
            pairs
                .into_iter()
                .map(|(bundle, store)| AppEntry::new(bundle, store, None))
                .collect(),
        )
    }

    /// Reverse lookup: store id → bundle id
    pub fn bundle_for_store(&self, store_id: &str) -> Option<&str> {
        self.by_store
            .get(store_id.trim())
            .map(|&idx| self.apps[idx].bundle_id.as_str())
    }

    /// Display name for a bundle id, falling back to the bundle id itself
    pub fn display_name<'a>(&'a self, bundle_id: &'a str) -> &'a str {
        self.by_bundle
            .get(bundle_id)
            .and_then(|&idx| self.apps[idx].name.as_deref())
            .unwrap_or(bundle_id)
    }

    /// Does `query` name this bundle id (by id or display name, case-insensitive)?
    pub fn matches_game(&self, bundle_id: &str, query: &str) -> bool {
        let query = query.trim();
        bundle_id.eq_ignore_ascii_case(query)
            || self.display_name(bundle_id).eq_ignore_ascii_case(query)
    }

    pub fn apps(&self) -> &[AppEntry] {
        &self.apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }
}

/// Apps tracked by the dashboard out of the box
pub fn default_apps() -> Vec<AppEntry> {
    vec![
        AppEntry::new(
            "com.tapmonkey.dinovillage2014",
            "id739067593",
            Some("Dino Water World-Dinosaur game"),
        ),
        AppEntry::new(
            "com.funvai.policevsthief",
            "id1542502766",
            Some("Police vs Thief 3D - car race"),
        ),
        AppEntry::new(
            "com.fpg.jseattack",
            "id1535441769",
            Some("Jurassic Sniper 3D"),
        ),
    ]
}
