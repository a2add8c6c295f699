use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TravelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pos {
    pub y: i32,
    pub x: i32,
}

impl Pos {
    /// "Anywhere on this level" when paired with a level.
    pub const UNKNOWN: Pos = Pos { y: -1, x: -1 };

    pub const fn new(y: i32, x: i32) -> Self {
        Self { y, x }
    }

    pub fn is_known(self) -> bool {
        self.y >= 0 && self.x >= 0
    }

    pub fn step(self, direction: Direction) -> Pos {
        let (dy, dx) = direction.delta();
        Pos { y: self.y + dy, x: self.x + dx }
    }

    pub fn chebyshev(self, other: Pos) -> u32 {
        self.y.abs_diff(other.y).max(self.x.abs_diff(other.x))
    }

    pub fn distance_sq(self, other: Pos) -> i32 {
        let dy = self.y - other.y;
        let dx = self.x - other.x;
        dy * dy + dx * dx
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.y, self.x)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    /// Neighbor expansion order: orthogonals before diagonals so routes don't zigzag.
    pub const SEARCH_ORDER: [Direction; 8] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
        Direction::NorthEast,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::NorthWest,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::North => (-1, 0),
            Direction::NorthEast => (-1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (1, 1),
            Direction::South => (1, 0),
            Direction::SouthWest => (1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (-1, -1),
        }
    }

    pub fn from_delta(dy: i32, dx: i32) -> Option<Direction> {
        if dy.abs() > 1 || dx.abs() > 1 {
            return None;
        }
        Self::SEARCH_ORDER.into_iter().find(|dir| dir.delta() == (dy, dx))
    }

    /// Direction of a single step from `from` to the adjacent cell `to`.
    pub fn between(from: Pos, to: Pos) -> Option<Direction> {
        Self::from_delta(to.y - from.y, to.x - from.x)
    }
}

pub fn neighbors(pos: Pos) -> [Pos; 8] {
    Direction::SEARCH_ORDER.map(|dir| pos.step(dir))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BranchId(pub u8);

impl fmt::Display for BranchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch#{}", self.0)
    }
}

/// A level is a branch plus a 1-based depth inside it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LevelId {
    pub branch: BranchId,
    pub depth: u8,
}

impl LevelId {
    pub fn new(branch: BranchId, depth: u8) -> Result<Self, TravelError> {
        if depth == 0 {
            return Err(TravelError::InvalidState(format!("{branch} has no depth 0")));
        }
        Ok(Self { branch, depth })
    }
}

impl fmt::Display for LevelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.branch.0, self.depth)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LevelPos {
    pub level: LevelId,
    pub pos: Pos,
}

impl LevelPos {
    pub fn new(level: LevelId, pos: Pos) -> Self {
        Self { level, pos }
    }

    pub fn anywhere(level: LevelId) -> Self {
        Self { level, pos: Pos::UNKNOWN }
    }

    pub fn is_resolved(&self) -> bool {
        self.pos.is_known()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TrapKind {
    Alarm,
    Dart,
    Net,
    Teleport,
    Shaft,
    Zot,
}

impl TrapKind {
    pub fn is_harmless_for(self, agent: &AgentProfile) -> bool {
        match self {
            TrapKind::Alarm => true,
            TrapKind::Shaft | TrapKind::Net => agent.flies,
            TrapKind::Dart | TrapKind::Teleport | TrapKind::Zot => agent.ignores_traps,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConnectorKind {
    StairsDown,
    StairsUp,
    HatchDown,
    HatchUp,
    BranchEntry(BranchId),
    BranchExit,
    Portal,
}

impl ConnectorKind {
    /// One-way connectors can't be retraced after crossing.
    pub fn is_one_way(self) -> bool {
        matches!(self, ConnectorKind::HatchDown | ConnectorKind::HatchUp)
    }

    /// The connector kind expected at the far end of a two-way crossing.
    pub fn reverse(self) -> Option<ConnectorKind> {
        match self {
            ConnectorKind::StairsDown => Some(ConnectorKind::StairsUp),
            ConnectorKind::StairsUp => Some(ConnectorKind::StairsDown),
            ConnectorKind::BranchEntry(_) => Some(ConnectorKind::BranchExit),
            ConnectorKind::Portal => Some(ConnectorKind::Portal),
            ConnectorKind::BranchExit | ConnectorKind::HatchDown | ConnectorKind::HatchUp => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Feature {
    Wall,
    Floor,
    ClosedDoor,
    OpenDoor,
    ShallowWater,
    DeepWater,
    Lava,
    /// Impassable and damaging to stand next to.
    HazardWall,
    Trap(TrapKind),
    Altar,
    Fountain,
    Shop,
    Connector(ConnectorKind),
}

impl Feature {
    pub fn is_floor_like(self) -> bool {
        matches!(
            self,
            Feature::Floor
                | Feature::OpenDoor
                | Feature::ShallowWater
                | Feature::Altar
                | Feature::Fountain
                | Feature::Shop
                | Feature::Connector(_)
        )
    }

    pub fn is_door(self) -> bool {
        matches!(self, Feature::ClosedDoor | Feature::OpenDoor)
    }

    pub fn is_trap(self) -> bool {
        matches!(self, Feature::Trap(_))
    }

    pub fn connector_kind(self) -> Option<ConnectorKind> {
        match self {
            Feature::Connector(kind) => Some(kind),
            _ => None,
        }
    }

    /// Anything but plain floor, liquids and walls is worth listing in a level inventory.
    pub fn is_noteworthy(self) -> bool {
        !matches!(
            self,
            Feature::Floor
                | Feature::ShallowWater
                | Feature::DeepWater
                | Feature::Lava
                | Feature::Wall
                | Feature::HazardWall
        )
    }

    /// Stable numeric code used for knowledge fingerprints.
    pub fn stable_code(self) -> u16 {
        match self {
            Feature::Wall => 1,
            Feature::Floor => 2,
            Feature::ClosedDoor => 3,
            Feature::OpenDoor => 4,
            Feature::ShallowWater => 5,
            Feature::DeepWater => 6,
            Feature::Lava => 7,
            Feature::HazardWall => 8,
            Feature::Trap(kind) => 0x100 + kind as u16,
            Feature::Altar => 9,
            Feature::Fountain => 10,
            Feature::Shop => 11,
            Feature::Connector(ConnectorKind::StairsDown) => 0x201,
            Feature::Connector(ConnectorKind::StairsUp) => 0x202,
            Feature::Connector(ConnectorKind::HatchDown) => 0x203,
            Feature::Connector(ConnectorKind::HatchUp) => 0x204,
            Feature::Connector(ConnectorKind::BranchExit) => 0x205,
            Feature::Connector(ConnectorKind::Portal) => 0x206,
            Feature::Connector(ConnectorKind::BranchEntry(BranchId(b))) => 0x1000 + u16::from(b),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CloudKind {
    Fire,
    Cold,
    Poison,
    Steam,
    Mist,
}

impl CloudKind {
    pub fn is_damaging_to(self, agent: &AgentProfile) -> bool {
        match self {
            CloudKind::Fire => !agent.fire_resistant,
            CloudKind::Steam => !agent.fire_resistant,
            CloudKind::Cold | CloudKind::Poison => true,
            CloudKind::Mist => false,
        }
    }
}

/// Movement-relevant traits of the travelling agent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentProfile {
    pub swims: bool,
    pub flies: bool,
    pub fire_resistant: bool,
    pub hazard_immune: bool,
    pub ignores_traps: bool,
}

/// Transient conditions that abandon any active travel session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AgentState {
    pub confused: bool,
    pub in_danger: bool,
}

impl AgentState {
    pub fn interrupts_travel(self) -> bool {
        self.confused || self.in_danger
    }
}
