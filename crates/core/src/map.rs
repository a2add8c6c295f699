//! Map-knowledge queries consumed by travel, plus a grid-backed implementation.
//! This module exists so pathfinding reads terrain, clouds and blockers through one narrow trait.
//! It does not own exclusions or any learned connector data.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::TravelError;
use crate::types::*;

/// Read-only view of what the agent knows about one level.
pub trait LevelView {
    /// `(height, width)` of the level grid.
    fn bounds(&self) -> (i32, i32);

    /// Known terrain, or `None` for cells never seen.
    fn feature_at(&self, pos: Pos) -> Option<Feature>;

    fn in_bounds(&self, pos: Pos) -> bool {
        let (height, width) = self.bounds();
        pos.y >= 0 && pos.x >= 0 && pos.y < height && pos.x < width
    }

    fn is_seen(&self, pos: Pos) -> bool {
        self.feature_at(pos).is_some()
    }

    /// Whether the cell is in view right now rather than remembered.
    fn is_visible(&self, _pos: Pos) -> bool {
        false
    }

    fn cloud_at(&self, _pos: Pos) -> Option<CloudKind> {
        None
    }

    fn is_damaging(&self, cloud: CloudKind, agent: &AgentProfile) -> bool {
        cloud.is_damaging_to(agent)
    }

    /// An immobile hostile stands here.
    fn monster_blocks(&self, _pos: Pos) -> bool {
        false
    }

    /// Something on this cell is worth a detour.
    fn needs_visit(&self, _pos: Pos, _autopickup: bool) -> bool {
        false
    }
}

/// Dense terrain grid with a seen mask, transient hazards and item markers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnownLevel {
    height: i32,
    width: i32,
    terrain: Vec<Feature>,
    seen: Vec<bool>,
    visible: Vec<bool>,
    clouds: BTreeMap<Pos, CloudKind>,
    blockers: BTreeSet<Pos>,
    items: BTreeSet<Pos>,
}

/// Result of parsing an ASCII layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLevel {
    pub level: KnownLevel,
    /// Position of the `@` glyph, if any.
    pub start: Option<Pos>,
}

impl KnownLevel {
    /// Open floor surrounded by walls, nothing seen yet.
    pub fn new(height: i32, width: i32) -> Self {
        let cells = (height.max(0) * width.max(0)) as usize;
        let mut level = Self {
            height,
            width,
            terrain: vec![Feature::Floor; cells],
            seen: vec![false; cells],
            visible: vec![false; cells],
            clouds: BTreeMap::new(),
            blockers: BTreeSet::new(),
            items: BTreeSet::new(),
        };
        for y in 0..height {
            for x in 0..width {
                if y == 0 || x == 0 || y == height - 1 || x == width - 1 {
                    level.set_terrain(Pos { y, x }, Feature::Wall);
                }
            }
        }
        level
    }

    /// Builds a level from rows of glyphs:
    ///
    /// `#` wall, `.` floor, `+` closed door, `'` open door, `~` shallow water,
    /// `w` deep water, `l` lava, `%` hazard wall, `^` dart trap, `"` alarm trap,
    /// `_` altar, `{` fountain, `S` shop, `>` / `<` stairs, `v` / `a` hatches,
    /// `E` branch exit, `O` portal, `1`-`9` branch entrances, `$` item on floor,
    /// `@` floor marking the start position.
    pub fn from_ascii(rows: &[&str]) -> Result<ParsedLevel, TravelError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |row| row.chars().count());
        if height == 0 || width == 0 {
            return Err(TravelError::InvalidState("empty level layout".to_string()));
        }

        let mut level = Self::new(height as i32, width as i32);
        let mut start = None;
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != width {
                return Err(TravelError::InvalidState(format!(
                    "row {y} has {} cells, expected {width}",
                    row.chars().count()
                )));
            }
            for (x, glyph) in row.chars().enumerate() {
                let pos = Pos { y: y as i32, x: x as i32 };
                let feature = match glyph {
                    '#' => Feature::Wall,
                    '.' => Feature::Floor,
                    '@' => {
                        start = Some(pos);
                        Feature::Floor
                    }
                    '$' => {
                        level.items.insert(pos);
                        Feature::Floor
                    }
                    '+' => Feature::ClosedDoor,
                    '\'' => Feature::OpenDoor,
                    '~' => Feature::ShallowWater,
                    'w' => Feature::DeepWater,
                    'l' => Feature::Lava,
                    '%' => Feature::HazardWall,
                    '^' => Feature::Trap(TrapKind::Dart),
                    '"' => Feature::Trap(TrapKind::Alarm),
                    '_' => Feature::Altar,
                    '{' => Feature::Fountain,
                    'S' => Feature::Shop,
                    '>' => Feature::Connector(ConnectorKind::StairsDown),
                    '<' => Feature::Connector(ConnectorKind::StairsUp),
                    'v' => Feature::Connector(ConnectorKind::HatchDown),
                    'a' => Feature::Connector(ConnectorKind::HatchUp),
                    'E' => Feature::Connector(ConnectorKind::BranchExit),
                    'O' => Feature::Connector(ConnectorKind::Portal),
                    '1'..='9' => {
                        let branch = glyph as u8 - b'0';
                        Feature::Connector(ConnectorKind::BranchEntry(BranchId(branch)))
                    }
                    other => {
                        return Err(TravelError::InvalidState(format!(
                            "unknown glyph {other:?} at {pos}"
                        )));
                    }
                };
                level.set_terrain(pos, feature);
            }
        }
        Ok(ParsedLevel { level, start })
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        if pos.y < 0 || pos.x < 0 || pos.y >= self.height || pos.x >= self.width {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    /// True terrain regardless of what has been seen; out of bounds reads as wall.
    pub fn terrain_at(&self, pos: Pos) -> Feature {
        self.index(pos).map_or(Feature::Wall, |i| self.terrain[i])
    }

    pub fn set_terrain(&mut self, pos: Pos, feature: Feature) {
        if let Some(i) = self.index(pos) {
            self.terrain[i] = feature;
        }
    }

    pub fn reveal_all(&mut self) {
        self.seen.fill(true);
    }

    pub fn forget(&mut self, pos: Pos) {
        if let Some(i) = self.index(pos) {
            self.seen[i] = false;
        }
    }

    /// Marks everything within `radius` (Chebyshev) of `center` as seen and currently visible.
    pub fn reveal_around(&mut self, center: Pos, radius: i32) {
        self.visible.fill(false);
        let radius = radius.max(0);
        let top = center.y.saturating_sub(radius).max(0);
        let bottom = center.y.saturating_add(radius).min(self.height - 1);
        let left = center.x.saturating_sub(radius).max(0);
        let right = center.x.saturating_add(radius).min(self.width - 1);
        for y in top..=bottom {
            for x in left..=right {
                if let Some(i) = self.index(Pos { y, x }) {
                    self.seen[i] = true;
                    self.visible[i] = true;
                }
            }
        }
    }

    pub fn set_cloud(&mut self, pos: Pos, cloud: Option<CloudKind>) {
        match cloud {
            Some(kind) => self.clouds.insert(pos, kind),
            None => self.clouds.remove(&pos),
        };
    }

    pub fn set_blocker(&mut self, pos: Pos, blocked: bool) {
        if blocked {
            self.blockers.insert(pos);
        } else {
            self.blockers.remove(&pos);
        }
    }

    pub fn place_item(&mut self, pos: Pos) {
        self.items.insert(pos);
    }

    pub fn take_item(&mut self, pos: Pos) -> bool {
        self.items.remove(&pos)
    }

    pub fn has_item(&self, pos: Pos) -> bool {
        self.items.contains(&pos)
    }

    /// Every connector in the true terrain, in position order.
    pub fn connectors(&self) -> Vec<(Pos, ConnectorKind)> {
        let mut found = Vec::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let pos = Pos { y, x };
                if let Some(kind) = self.terrain_at(pos).connector_kind() {
                    found.push((pos, kind));
                }
            }
        }
        found
    }
}

impl LevelView for KnownLevel {
    fn bounds(&self) -> (i32, i32) {
        (self.height, self.width)
    }

    fn feature_at(&self, pos: Pos) -> Option<Feature> {
        let i = self.index(pos)?;
        self.seen[i].then_some(self.terrain[i])
    }

    fn is_visible(&self, pos: Pos) -> bool {
        self.index(pos).is_some_and(|i| self.visible[i])
    }

    fn cloud_at(&self, pos: Pos) -> Option<CloudKind> {
        self.clouds.get(&pos).copied()
    }

    fn monster_blocks(&self, pos: Pos) -> bool {
        self.blockers.contains(&pos)
    }

    fn needs_visit(&self, pos: Pos, autopickup: bool) -> bool {
        autopickup && self.items.contains(&pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_layout_parses_glyphs_and_start() {
        let parsed = KnownLevel::from_ascii(&["#####", "#@>$#", "#####"]).expect("valid layout");
        assert_eq!(parsed.start, Some(Pos::new(1, 1)));
        let level = parsed.level;
        assert_eq!(level.terrain_at(Pos::new(1, 2)), Feature::Connector(ConnectorKind::StairsDown));
        assert!(level.has_item(Pos::new(1, 3)));
        assert_eq!(level.feature_at(Pos::new(1, 2)), None, "nothing is seen until revealed");
        assert_eq!(level.connectors(), vec![(Pos::new(1, 2), ConnectorKind::StairsDown)]);
    }

    #[test]
    fn ascii_layout_rejects_ragged_rows_and_unknown_glyphs() {
        assert!(KnownLevel::from_ascii(&["###", "##"]).is_err());
        assert!(KnownLevel::from_ascii(&["#Q#"]).is_err());
        assert!(KnownLevel::from_ascii(&[]).is_err());
    }

    #[test]
    fn reveal_around_marks_seen_and_visible() {
        let mut level = KnownLevel::new(10, 10);
        level.reveal_around(Pos::new(5, 5), 1);
        assert_eq!(level.feature_at(Pos::new(4, 4)), Some(Feature::Floor));
        assert!(level.is_visible(Pos::new(6, 6)));
        assert!(!level.is_seen(Pos::new(2, 2)));

        level.reveal_around(Pos::new(2, 2), 0);
        assert!(level.is_seen(Pos::new(6, 6)), "seen cells stay remembered");
        assert!(!level.is_visible(Pos::new(6, 6)));
    }
}
