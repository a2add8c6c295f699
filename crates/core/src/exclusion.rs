//! Exclusion zones: circular regions travel must not path through.
//! This module exists to keep the zone geometry and bookkeeping in one place.
//! It does not decide traversability on its own; the safety oracle combines it with terrain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Pos;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ExclusionKind {
    /// Marked by the player.
    Manual,
    /// Placed around a dangerous sighting.
    Auto,
    /// Annotation only; never blocks travel.
    StairMarker,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub center: Pos,
    pub radius: u8,
    pub kind: ExclusionKind,
    #[serde(default)]
    pub label: Option<String>,
}

impl Exclusion {
    pub fn new(center: Pos, radius: u8, kind: ExclusionKind) -> Self {
        Self { center, radius, kind, label: None }
    }

    pub fn covers(&self, pos: Pos) -> bool {
        let r = i32::from(self.radius);
        pos.distance_sq(self.center) <= r * r
    }

    pub fn is_hard(&self) -> bool {
        self.kind != ExclusionKind::StairMarker
    }

    pub fn reason(&self) -> String {
        match (&self.label, self.kind) {
            (Some(label), _) => label.clone(),
            (None, ExclusionKind::Manual) => "excluded".to_string(),
            (None, ExclusionKind::Auto) => "danger nearby".to_string(),
            (None, ExclusionKind::StairMarker) => "marked stairs".to_string(),
        }
    }
}

/// Zones keyed by their center; at most one zone per center.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    zones: BTreeMap<Pos, Exclusion>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Exclusion> {
        self.zones.values()
    }

    pub fn has_hard_zones(&self) -> bool {
        self.zones.values().any(Exclusion::is_hard)
    }

    pub fn insert(&mut self, exclusion: Exclusion) -> Option<Exclusion> {
        self.zones.insert(exclusion.center, exclusion)
    }

    pub fn remove(&mut self, center: Pos) -> Option<Exclusion> {
        self.zones.remove(&center)
    }

    pub fn clear(&mut self) {
        self.zones.clear();
    }

    /// Removes the zone centered on `center` if there is one, otherwise adds one.
    /// Returns whether a zone now exists at `center`.
    pub fn toggle(&mut self, center: Pos, radius: u8, kind: ExclusionKind) -> bool {
        if self.zones.remove(&center).is_some() {
            return false;
        }
        self.zones.insert(center, Exclusion::new(center, radius, kind));
        true
    }

    pub fn is_excluded(&self, pos: Pos) -> bool {
        self.zones.values().any(|zone| zone.is_hard() && zone.covers(pos))
    }

    pub fn is_exclude_root(&self, pos: Pos) -> bool {
        self.zones.contains_key(&pos)
    }

    /// The zone responsible for excluding `pos`, preferring hard zones.
    pub fn exclusion_at(&self, pos: Pos) -> Option<&Exclusion> {
        let mut covering = self.zones.values().filter(|zone| zone.covers(pos));
        let first = covering.next()?;
        if first.is_hard() {
            return Some(first);
        }
        Some(covering.find(|zone| zone.is_hard()).unwrap_or(first))
    }

    pub fn radius_reason(&self, pos: Pos) -> Option<String> {
        self.exclusion_at(pos).map(Exclusion::reason)
    }
}
