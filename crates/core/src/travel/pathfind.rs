//! Round-based flood fill over a single level.
//! This module exists to turn per-cell safety verdicts into distances, next steps and paths.
//! It does not own explore policy or anything that spans levels.
//!
//! Round *k* of a flood expands exactly the cells first reached at cumulative cost *k*.
//! A cell that costs more than one round to enter is stamped with its final distance
//! when first reached but is carried forward, round after round, until that distance
//! comes up; round order therefore always equals distance order.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use super::*;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellStatus {
    Unknown,
    Unsafe(UnsafeReason),
    Distance(u32),
    /// Reached only after crossing something the strict rules refuse.
    Risky(u32),
}

impl CellStatus {
    pub fn distance(self) -> Option<u32> {
        match self {
            CellStatus::Distance(d) => Some(d),
            _ => None,
        }
    }

    pub fn distance_with_risk(self) -> Option<u32> {
        match self {
            CellStatus::Distance(d) | CellStatus::Risky(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_reached(self) -> bool {
        self.distance_with_risk().is_some()
    }
}

/// Scratch distance map, fully overwritten by every flood.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistanceGrid {
    height: i32,
    width: i32,
    cells: Vec<CellStatus>,
}

impl DistanceGrid {
    pub fn new(height: i32, width: i32) -> Self {
        let mut grid = Self::default();
        grid.reset(height, width);
        grid
    }

    pub fn reset(&mut self, height: i32, width: i32) {
        self.height = height.max(0);
        self.width = width.max(0);
        self.cells.clear();
        self.cells.resize((self.height * self.width) as usize, CellStatus::Unknown);
    }

    pub fn bounds(&self) -> (i32, i32) {
        (self.height, self.width)
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        if pos.y < 0 || pos.x < 0 || pos.y >= self.height || pos.x >= self.width {
            return None;
        }
        Some((pos.y * self.width + pos.x) as usize)
    }

    pub fn get(&self, pos: Pos) -> CellStatus {
        self.index(pos).map_or(CellStatus::Unsafe(UnsafeReason::OutOfBounds), |i| self.cells[i])
    }

    pub fn set(&mut self, pos: Pos, status: CellStatus) {
        if let Some(i) = self.index(pos) {
            self.cells[i] = status;
        }
    }

    pub fn distance(&self, pos: Pos) -> Option<u32> {
        self.get(pos).distance()
    }

    /// Cells with a strict distance, in row-major order.
    pub fn reached(&self) -> impl Iterator<Item = (Pos, u32)> + '_ {
        self.cells.iter().enumerate().filter_map(|(i, status)| {
            let d = status.distance()?;
            let i = i as i32;
            Some((Pos { y: i / self.width, x: i % self.width }, d))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathStep {
    Arrived,
    Step {
        direction: Direction,
        next: Pos,
        /// Rounds still needed after taking this step.
        remaining: u32,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct NodeIdx(u32);

/// Arena entry; `prev` is the node this cell was first reached from.
#[derive(Clone, Copy, Debug)]
struct FloodNode {
    pos: Pos,
    prev: Option<NodeIdx>,
}

#[derive(Clone, Copy, Debug)]
struct FloodPass {
    policy: TraversalPolicy,
    goal: Option<Pos>,
    risky: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FloodEnd {
    Exhausted,
    Stopped,
    Touched(NodeIdx),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum FloodOutcome {
    Exhausted,
    Stopped,
}

/// Owns every buffer a flood needs so repeated searches don't reallocate.
#[derive(Clone, Debug, Default)]
pub struct Pathfinder {
    grid: DistanceGrid,
    arena: Vec<FloodNode>,
    current: Vec<NodeIdx>,
    next: Vec<NodeIdx>,
    hazards: Vec<(Pos, u32)>,
}

impl Pathfinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distances left behind by the most recent flood.
    pub fn grid(&self) -> &DistanceGrid {
        &self.grid
    }

    /// Strict flood from `seed`.
    pub fn distances_from(&mut self, oracle: &SafetyOracle<'_>, seed: Pos) -> &DistanceGrid {
        self.flood_from(oracle, seed, &mut |_, _, _| ControlFlow::Continue(()));
        &self.grid
    }

    /// Strict flood from `seed`, then a reseed from hazard-blocked cells stamping `Risky`.
    pub fn distances_with_risk(&mut self, oracle: &SafetyOracle<'_>, seed: Pos) -> &DistanceGrid {
        let mut ignore = |_: &DistanceGrid, _: Pos, _: u32| ControlFlow::Continue(());
        self.flood_from(oracle, seed, &mut ignore);
        self.flood_hazards(oracle, &mut ignore);
        &self.grid
    }

    /// One step from `from` toward `to`.
    ///
    /// The flood runs backwards from the destination and stops as soon as it touches
    /// the agent, which then steps onto the cell that touched it.
    pub fn next_step(
        &mut self,
        oracle: &SafetyOracle<'_>,
        from: Pos,
        to: Pos,
    ) -> Result<PathStep, TravelError> {
        if from == to {
            return Ok(PathStep::Arrived);
        }
        if !is_acceptable_destination(oracle, to) || !oracle.view().in_bounds(from) {
            return Err(TravelError::NoPath);
        }

        self.begin(oracle.view());
        self.seed(to, CellStatus::Distance(0));
        let pass = FloodPass { policy: TraversalPolicy::STRICT, goal: Some(from), risky: false };
        match self.run_pass(oracle, pass, &mut |_, _, _| ControlFlow::Continue(())) {
            FloodEnd::Touched(idx) => {
                let next = self.node(idx).pos;
                let direction = Direction::between(from, next).ok_or(TravelError::NoPath)?;
                let remaining = self.grid.distance(next).unwrap_or(0);
                Ok(PathStep::Step { direction, next, remaining })
            }
            FloodEnd::Exhausted | FloodEnd::Stopped => Err(TravelError::NoPath),
        }
    }

    /// Full cell sequence from `from` (excluded) to `to` (included).
    pub fn path(&mut self, oracle: &SafetyOracle<'_>, from: Pos, to: Pos) -> Option<Vec<Pos>> {
        if from == to {
            return Some(Vec::new());
        }
        if !is_acceptable_destination(oracle, to) {
            return None;
        }

        self.begin(oracle.view());
        self.seed(from, CellStatus::Distance(0));
        let pass = FloodPass { policy: TraversalPolicy::STRICT, goal: Some(to), risky: false };
        let FloodEnd::Touched(idx) =
            self.run_pass(oracle, pass, &mut |_, _, _| ControlFlow::Continue(()))
        else {
            return None;
        };

        let mut cells = vec![to];
        let mut cursor = idx;
        while let Some(prev) = self.node(cursor).prev {
            cells.push(self.node(cursor).pos);
            cursor = prev;
        }
        cells.reverse();
        Some(cells)
    }

    /// Every noteworthy cell reachable from `seed`, including ones reachable only with risk.
    ///
    /// `extra` adds caller-specific cells of interest such as waypoints. Item cells are only
    /// listed when `autopickup` would make the agent want them.
    pub fn collect_features(
        &mut self,
        oracle: &SafetyOracle<'_>,
        seed: Pos,
        extra: &[Pos],
        autopickup: bool,
    ) -> Vec<Pos> {
        let view = oracle.view();
        let exclusions = oracle.exclusions();
        let mut found = BTreeSet::new();
        let mut note = |_: &DistanceGrid, pos: Pos, _: u32| {
            let noteworthy = view.feature_at(pos).is_some_and(Feature::is_noteworthy);
            if noteworthy
                || extra.contains(&pos)
                || exclusions.is_exclude_root(pos)
                || view.needs_visit(pos, autopickup)
            {
                found.insert(pos);
            }
            ControlFlow::Continue(())
        };
        self.flood_from(oracle, seed, &mut note);
        self.flood_hazards(oracle, &mut note);

        // Exclusion centers are listed wherever they are.
        for zone in exclusions.iter() {
            if view.in_bounds(zone.center) {
                found.insert(zone.center);
            }
        }
        found.into_iter().collect()
    }

    /// Strict flood from `seed`, calling `visit` as each cell is expanded in distance order.
    /// Hazard-blocked cells met on the way are remembered for [`Self::flood_hazards`].
    pub(super) fn flood_from<F>(
        &mut self,
        oracle: &SafetyOracle<'_>,
        seed: Pos,
        visit: &mut F,
    ) -> FloodOutcome
    where
        F: FnMut(&DistanceGrid, Pos, u32) -> ControlFlow<()>,
    {
        self.begin(oracle.view());
        self.seed(seed, CellStatus::Distance(0));
        let pass = FloodPass { policy: TraversalPolicy::STRICT, goal: None, risky: false };
        match self.run_pass(oracle, pass, visit) {
            FloodEnd::Stopped => FloodOutcome::Stopped,
            FloodEnd::Exhausted | FloodEnd::Touched(_) => FloodOutcome::Exhausted,
        }
    }

    /// Continues the last strict flood from every hazard-blocked cell it ran into,
    /// with hostile terrain and danger ignored. Cells reached this way become `Risky`.
    pub(super) fn flood_hazards<F>(&mut self, oracle: &SafetyOracle<'_>, visit: &mut F) -> FloodOutcome
    where
        F: FnMut(&DistanceGrid, Pos, u32) -> ControlFlow<()>,
    {
        self.current.clear();
        self.next.clear();
        let hazards = std::mem::take(&mut self.hazards);
        for (pos, distance) in hazards {
            if !self.grid.get(pos).is_reached() {
                self.seed(pos, CellStatus::Risky(distance));
            }
        }
        if self.current.is_empty() {
            return FloodOutcome::Exhausted;
        }
        let pass = FloodPass { policy: TraversalPolicy::RISKY, goal: None, risky: true };
        match self.run_pass(oracle, pass, visit) {
            FloodEnd::Stopped => FloodOutcome::Stopped,
            FloodEnd::Exhausted | FloodEnd::Touched(_) => FloodOutcome::Exhausted,
        }
    }

    fn begin(&mut self, view: &dyn LevelView) {
        let (height, width) = view.bounds();
        self.grid.reset(height, width);
        self.arena.clear();
        self.current.clear();
        self.next.clear();
        self.hazards.clear();
    }

    fn seed(&mut self, pos: Pos, status: CellStatus) {
        if self.grid.index(pos).is_none() {
            return;
        }
        self.grid.set(pos, status);
        let idx = self.push_node(pos, None);
        self.current.push(idx);
    }

    fn push_node(&mut self, pos: Pos, prev: Option<NodeIdx>) -> NodeIdx {
        let idx = NodeIdx(self.arena.len() as u32);
        self.arena.push(FloodNode { pos, prev });
        idx
    }

    fn node(&self, idx: NodeIdx) -> FloodNode {
        self.arena[idx.0 as usize]
    }

    fn run_pass<F>(&mut self, oracle: &SafetyOracle<'_>, pass: FloodPass, visit: &mut F) -> FloodEnd
    where
        F: FnMut(&DistanceGrid, Pos, u32) -> ControlFlow<()>,
    {
        let Some(mut round) = self
            .current
            .iter()
            .filter_map(|&idx| self.grid.get(self.node(idx).pos).distance_with_risk())
            .min()
        else {
            return FloodEnd::Exhausted;
        };

        while !self.current.is_empty() {
            for i in 0..self.current.len() {
                let idx = self.current[i];
                let pos = self.node(idx).pos;
                let Some(arrival) = self.grid.get(pos).distance_with_risk() else {
                    continue;
                };
                if arrival > round {
                    self.next.push(idx);
                    continue;
                }
                if visit(&self.grid, pos, arrival).is_break() {
                    return FloodEnd::Stopped;
                }

                for neighbor in neighbors(pos) {
                    if Some(neighbor) == pass.goal {
                        return FloodEnd::Touched(idx);
                    }
                    let claimable = match self.grid.get(neighbor) {
                        CellStatus::Unknown => true,
                        CellStatus::Unsafe(UnsafeReason::OutOfBounds) => false,
                        CellStatus::Unsafe(_) => pass.risky,
                        CellStatus::Distance(_) | CellStatus::Risky(_) => false,
                    };
                    if !claimable {
                        continue;
                    }
                    let reached_at = round + oracle.traversal_cost(neighbor);
                    match oracle.classify(neighbor, pass.policy) {
                        Ok(()) => {
                            let status = if pass.risky {
                                CellStatus::Risky(reached_at)
                            } else {
                                CellStatus::Distance(reached_at)
                            };
                            self.grid.set(neighbor, status);
                            let node = self.push_node(neighbor, Some(idx));
                            self.next.push(node);
                        }
                        Err(reason) => {
                            if self.grid.get(neighbor) == CellStatus::Unknown {
                                self.grid.set(neighbor, CellStatus::Unsafe(reason));
                                if !pass.risky && oracle.is_hazard_blocked(neighbor) {
                                    self.hazards.push((neighbor, reached_at));
                                }
                            }
                        }
                    }
                }
            }
            self.current.clear();
            std::mem::swap(&mut self.current, &mut self.next);
            round += 1;
        }
        FloodEnd::Exhausted
    }
}

/// Unsafe destinations are refused, except traps the agent may deliberately step on.
fn is_acceptable_destination(oracle: &SafetyOracle<'_>, to: Pos) -> bool {
    let view = oracle.view();
    if !view.in_bounds(to) {
        return false;
    }
    view.feature_at(to).is_some_and(Feature::is_trap)
        || oracle.is_traversable(to, TraversalPolicy::STRICT)
}
