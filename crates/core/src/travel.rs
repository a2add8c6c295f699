//! Travel and explore sessions driven one step at a time.
//! This module exists to own the travel context: the learned connector cache, tunables,
//! search scratch space and the active session, threaded explicitly through every call.
//! It does not move the agent; callers apply each returned action to their world.

use std::collections::BTreeSet;

use crate::branch::BranchTable;
use crate::error::TravelError;
use crate::exclusion::{Exclusion, ExclusionKind, ExclusionSet};
use crate::map::LevelView;
use crate::options::TravelOptions;
use crate::types::*;

mod cache;
mod explore;
mod level_info;
mod pathfind;
mod planner;
mod safety;
#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{TravelCache, WAYPOINT_COUNT};
pub use explore::{
    ExploreOutcome, ExploreRequest, ExploreTarget, ExploreTargetKind, is_target_still_valid,
    select_explore_target,
};
pub use level_info::{
    Connector, ConnectorState, LevelInfo, ObservedConnector, knowledge_fingerprint,
    scan_connectors,
};
pub use pathfind::{CellStatus, DistanceGrid, PathStep, Pathfinder};
pub use planner::{Route, RouteLeg, RoutePlan, RoutePlanner, RouteRequest};
pub use safety::{SafetyInputs, SafetyOracle, TraversalPolicy, UnsafeReason};

/// The world as travel sees it: where the agent is and what it knows of each level.
pub trait TravelWorld {
    fn current_level(&self) -> LevelId;
    fn agent_pos(&self) -> Pos;
    fn agent(&self) -> AgentProfile;

    fn agent_state(&self) -> AgentState {
        AgentState::default()
    }

    /// Map knowledge for `level`, or `None` if the agent has never been there.
    fn level_view(&self, level: LevelId) -> Option<&dyn LevelView>;
}

/// Takes the connector under the agent.
pub trait LevelTransition {
    /// Where the agent ended up, or `None` if the connector did not work.
    fn traverse(&mut self, from: LevelPos) -> Option<LevelPos>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TravelAction {
    Move(Direction),
    /// The agent stands on the connector at this position and should take it.
    TakeConnector(Pos),
    Arrived,
    Blocked(StopReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    NoPath,
    /// No known connector chain leads toward this level yet.
    RouteUnknown(LevelId),
    Interrupted,
    FullyExplored,
    PartlyExplored,
    /// The route detours through this level; travel resumes after `confirm_detour`.
    NeedsConfirmation(LevelId),
    /// The same connector was taken twice without changing level.
    RepeatedConnector,
    /// Greedy explore reached an item under the agent.
    ReachedItem(Pos),
}

impl StopReason {
    /// The single line shown to the player.
    pub fn status_line(&self, branches: &BranchTable) -> String {
        match self {
            StopReason::NoPath => "Can't reach that.".to_string(),
            StopReason::RouteUnknown(level) => {
                format!("Don't know how to get to {}.", branches.describe(*level))
            }
            StopReason::Interrupted => "Travel interrupted.".to_string(),
            StopReason::FullyExplored => "Done exploring.".to_string(),
            StopReason::PartlyExplored => "Partly explored, can't reach some places.".to_string(),
            StopReason::NeedsConfirmation(level) => {
                format!("The route passes through {}. Travel anyway?", branches.describe(*level))
            }
            StopReason::RepeatedConnector => "That way doesn't lead anywhere new.".to_string(),
            StopReason::ReachedItem(pos) => format!("Found something at {pos}."),
        }
    }

    /// Whether the session survives this stop.
    pub fn keeps_session(&self) -> bool {
        matches!(self, StopReason::NeedsConfirmation(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TravelGoal {
    /// A cell on the current level with a direct path.
    Cell(LevelPos),
    Interlevel(LevelPos),
    Explore { greedy: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct TravelSession {
    goal: TravelGoal,
    /// Level the trip started from.
    origin: LevelId,
    explore_target: Option<ExploreTarget>,
    last_take: Option<LevelPos>,
    detour_confirmed: bool,
}

impl TravelSession {
    fn new(goal: TravelGoal, origin: LevelId) -> Self {
        Self { goal, origin, explore_target: None, last_take: None, detour_confirmed: false }
    }
}

pub struct TravelContext {
    cache: TravelCache,
    options: TravelOptions,
    branches: BranchTable,
    pathfinder: Pathfinder,
    planner: RoutePlanner,
    target_grid: DistanceGrid,
    session: Option<TravelSession>,
}

fn oracle_on<'a>(
    cache: &'a TravelCache,
    options: &'a TravelOptions,
    empty: &'a ExclusionSet,
    view: &'a dyn LevelView,
    agent: AgentProfile,
    level: LevelId,
) -> SafetyOracle<'a> {
    let exclusions = cache.level(level).map_or(empty, LevelInfo::exclusions);
    SafetyOracle::new(SafetyInputs { view, agent, forbidden: &options.forbidden_features }, exclusions)
}

fn view_of(world: &impl TravelWorld, level: LevelId) -> Result<&dyn LevelView, TravelError> {
    world
        .level_view(level)
        .ok_or_else(|| TravelError::InvalidState(format!("no map knowledge for level {level}")))
}

impl TravelContext {
    pub fn new(options: TravelOptions, branches: BranchTable) -> Self {
        Self::with_cache(TravelCache::new(), options, branches)
    }

    pub fn with_cache(cache: TravelCache, options: TravelOptions, branches: BranchTable) -> Self {
        Self {
            cache,
            options,
            branches,
            pathfinder: Pathfinder::new(),
            planner: RoutePlanner::new(),
            target_grid: DistanceGrid::default(),
            session: None,
        }
    }

    pub fn cache(&self) -> &TravelCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TravelCache {
        &mut self.cache
    }

    pub fn into_cache(self) -> TravelCache {
        self.cache
    }

    pub fn options(&self) -> &TravelOptions {
        &self.options
    }

    pub fn branches(&self) -> &BranchTable {
        &self.branches
    }

    pub fn goal(&self) -> Option<TravelGoal> {
        self.session.as_ref().map(|s| s.goal)
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Rebuilds the current level's connector graph if the map knowledge behind it changed.
    /// Returns whether a rebuild happened.
    pub fn refresh_level(&mut self, world: &impl TravelWorld) -> Result<bool, TravelError> {
        let id = world.current_level();
        self.branches.validate(id)?;
        let view = view_of(world, id)?;
        let info = self.cache.level_mut(id);
        if info.check_fresh(knowledge_fingerprint(view, info.exclusions())).is_ok() {
            return Ok(false);
        }
        let inputs = SafetyInputs {
            view,
            agent: world.agent(),
            forbidden: &self.options.forbidden_features,
        };
        info.record_observed(&scan_connectors(view), &self.branches, inputs, &mut self.pathfinder);
        Ok(true)
    }

    /// Rebuilds levels away from the agent whose exclusions changed since their matrix was
    /// built. Without a map to rebuild from, their distances are dropped instead.
    fn refresh_stale_levels(&mut self, world: &impl TravelWorld) {
        let stale: Vec<LevelId> = self
            .cache
            .levels()
            .filter(|info| info.has_stale_distances())
            .map(LevelInfo::id)
            .collect();
        for id in stale {
            let info = self.cache.level_mut(id);
            match world.level_view(id) {
                Some(view) => {
                    let inputs = SafetyInputs {
                        view,
                        agent: world.agent(),
                        forbidden: &self.options.forbidden_features,
                    };
                    info.recompute_distances(inputs, &mut self.pathfinder);
                }
                None => {
                    tracing::debug!(
                        target: "travel::driver",
                        level = %id,
                        "no map for stale level, dropping its distances"
                    );
                    info.forget_distances();
                }
            }
        }
    }

    /// Travel to `cell` on the current level. A known, safe cell with no direct path is
    /// approached through other levels instead.
    pub fn start_travel(&mut self, world: &impl TravelWorld, cell: Pos) -> Result<(), TravelError> {
        let level = world.current_level();
        self.branches.validate(level)?;
        let view = view_of(world, level)?;
        if !view.in_bounds(cell) {
            return Err(TravelError::InvalidState(format!("{cell} is outside level {level}")));
        }
        let target = LevelPos::new(level, cell);
        let goal = match self.step_on_level(world, cell) {
            Ok(_) => TravelGoal::Cell(target),
            Err(TravelError::NoPath) if self.is_known_safe(world, cell) => {
                tracing::debug!(target: "travel::driver", %cell, "no direct path, routing via other levels");
                TravelGoal::Interlevel(target)
            }
            Err(err) => return Err(err),
        };
        self.session = Some(TravelSession::new(goal, level));
        Ok(())
    }

    pub fn start_interlevel_travel(
        &mut self,
        world: &impl TravelWorld,
        target: LevelPos,
    ) -> Result<(), TravelError> {
        let here = world.current_level();
        self.branches.validate(here)?;
        self.branches.validate(target.level)?;
        if target.pos.is_known()
            && let Some(view) = world.level_view(target.level)
            && !view.in_bounds(target.pos)
        {
            return Err(TravelError::InvalidState(format!(
                "{} is outside level {}",
                target.pos, target.level
            )));
        }
        tracing::debug!(
            target: "travel::driver",
            to = %self.branches.describe(target.level),
            pos = %target.pos,
            "interlevel travel started"
        );
        self.session = Some(TravelSession::new(TravelGoal::Interlevel(target), here));
        Ok(())
    }

    pub fn set_waypoint(&mut self, world: &impl TravelWorld, number: usize) -> Result<(), TravelError> {
        let at = LevelPos::new(world.current_level(), world.agent_pos());
        self.cache.set_waypoint(number, at)
    }

    pub fn travel_to_waypoint(&mut self, world: &impl TravelWorld, number: usize) -> Result<(), TravelError> {
        let target = self
            .cache
            .waypoint(number)
            .ok_or_else(|| TravelError::InvalidState(format!("waypoint {number} is not set")))?;
        self.start_interlevel_travel(world, target)
    }

    pub fn start_explore(&mut self, world: &impl TravelWorld, greedy: bool) -> Result<(), TravelError> {
        let level = world.current_level();
        self.branches.validate(level)?;
        self.session = Some(TravelSession::new(TravelGoal::Explore { greedy }, level));
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            tracing::debug!(target: "travel::driver", "travel stopped");
        }
    }

    pub fn confirm_detour(&mut self) -> Result<(), TravelError> {
        let session = self.session.as_mut().ok_or(TravelError::NoSession)?;
        session.detour_confirmed = true;
        Ok(())
    }

    /// Explore step, starting a plain explore session if none is running.
    pub fn explore_step(&mut self, world: &impl TravelWorld) -> Result<TravelAction, TravelError> {
        if !matches!(self.goal(), Some(TravelGoal::Explore { .. })) {
            self.start_explore(world, false)?;
        }
        self.next_step(world)
    }

    /// The next action for the active session. Stops end the session except where noted
    /// on [`StopReason`].
    pub fn next_step(&mut self, world: &impl TravelWorld) -> Result<TravelAction, TravelError> {
        let session = self.session.clone().ok_or(TravelError::NoSession)?;
        if world.agent_state().interrupts_travel() {
            return Ok(self.finish(StopReason::Interrupted));
        }
        self.refresh_level(world)?;

        match session.goal {
            TravelGoal::Cell(target) => Ok(self.cell_step(world, target)),
            TravelGoal::Interlevel(target) => self.interlevel_step(world, &session, target),
            TravelGoal::Explore { greedy } => self.explore_action(world, &session, greedy),
        }
    }

    /// Takes the connector under the agent and records where it led.
    pub fn cross_connector<W>(&mut self, world: &mut W) -> Result<LevelPos, TravelError>
    where
        W: TravelWorld + LevelTransition,
    {
        let from = LevelPos::new(world.current_level(), world.agent_pos());
        let kind = view_of(&*world, from.level)?
            .feature_at(from.pos)
            .and_then(Feature::connector_kind)
            .ok_or_else(|| TravelError::InvalidState(format!("no connector at {}", from.pos)))?;
        let to = world.traverse(from).ok_or(TravelError::NoPath)?;
        self.record_transition(from, kind, to);
        Ok(to)
    }

    /// Learns from a connector crossing the caller performed itself.
    pub fn record_transition(&mut self, from: LevelPos, kind: ConnectorKind, to: LevelPos) {
        if from.level == to.level {
            return;
        }
        self.cache.record_crossing(from, kind, to);
        if let Some(session) = self.session.as_mut() {
            session.last_take = None;
            session.explore_target = None;
        }
    }

    /// Places or removes a manual exclusion; returns true if one was placed.
    pub fn toggle_exclusion(&mut self, level: LevelId, center: Pos) -> bool {
        let radius = self.options.exclude_radius;
        self.cache.level_mut(level).exclusions_mut().toggle(center, radius, ExclusionKind::Manual)
    }

    pub fn add_exclusion(&mut self, level: LevelId, exclusion: Exclusion) {
        self.cache.level_mut(level).exclusions_mut().insert(exclusion);
    }

    pub fn clear_exclusions(&mut self, level: LevelId) {
        self.cache.level_mut(level).exclusions_mut().clear();
    }

    /// Noteworthy cells reachable from the agent, waypoints on this level included.
    pub fn interesting_features(&mut self, world: &impl TravelWorld) -> Result<Vec<Pos>, TravelError> {
        let level = world.current_level();
        let view = view_of(world, level)?;
        let waypoints = self.cache.waypoints_on(level);
        let empty = ExclusionSet::new();
        let oracle = oracle_on(&self.cache, &self.options, &empty, view, world.agent(), level);
        let autopickup = self.options.autopickup;
        Ok(self.pathfinder.collect_features(&oracle, world.agent_pos(), &waypoints, autopickup))
    }

    fn finish(&mut self, reason: StopReason) -> TravelAction {
        if !reason.keeps_session() {
            self.session = None;
        }
        tracing::debug!(target: "travel::driver", reason = ?reason, "travel stopped");
        TravelAction::Blocked(reason)
    }

    fn arrive(&mut self) -> TravelAction {
        self.session = None;
        tracing::debug!(target: "travel::driver", "arrived");
        TravelAction::Arrived
    }

    fn is_known_safe(&self, world: &impl TravelWorld, cell: Pos) -> bool {
        let level = world.current_level();
        let Some(view) = world.level_view(level) else {
            return false;
        };
        let empty = ExclusionSet::new();
        let oracle = oracle_on(&self.cache, &self.options, &empty, view, world.agent(), level);
        oracle.is_traversable(cell, TraversalPolicy::STRICT)
    }

    fn step_on_level(&mut self, world: &impl TravelWorld, to: Pos) -> Result<PathStep, TravelError> {
        let level = world.current_level();
        let view = view_of(world, level)?;
        let empty = ExclusionSet::new();
        let oracle = oracle_on(&self.cache, &self.options, &empty, view, world.agent(), level);
        self.pathfinder.next_step(&oracle, world.agent_pos(), to)
    }

    fn step_action(&mut self, step: PathStep) -> TravelAction {
        match step {
            PathStep::Arrived => self.arrive(),
            PathStep::Step { direction, .. } => TravelAction::Move(direction),
        }
    }

    fn cell_step(&mut self, world: &impl TravelWorld, target: LevelPos) -> TravelAction {
        if world.current_level() != target.level {
            return self.finish(StopReason::NoPath);
        }
        match self.step_on_level(world, target.pos) {
            Ok(step) => self.step_action(step),
            Err(_) => self.finish(StopReason::NoPath),
        }
    }

    fn interlevel_step(
        &mut self,
        world: &impl TravelWorld,
        session: &TravelSession,
        target: LevelPos,
    ) -> Result<TravelAction, TravelError> {
        let here = LevelPos::new(world.current_level(), world.agent_pos());
        if here.level == target.level {
            if !target.pos.is_known() || here.pos == target.pos {
                return Ok(self.arrive());
            }
            if let Ok(step) = self.step_on_level(world, target.pos) {
                return Ok(self.step_action(step));
            }
        }

        let check_detours = self.options.confirm_detours && !session.detour_confirmed;
        let plan = self.plan_route(world, here, target, session.origin, check_detours)?;
        let route = match plan.into_result() {
            Ok(route) => route,
            Err(TravelError::PartiallyUnknown(level)) => {
                return Ok(self.finish(StopReason::RouteUnknown(level)));
            }
            Err(_) => return Ok(self.finish(StopReason::NoPath)),
        };
        if let Some(level) = route.detour {
            return Ok(self.finish(StopReason::NeedsConfirmation(level)));
        }

        let Some(connector) = route.first_connector() else {
            return Ok(match self.step_on_level(world, target.pos) {
                Ok(step) => self.step_action(step),
                Err(_) => self.finish(StopReason::NoPath),
            });
        };
        if here.pos == connector {
            if session.last_take == Some(here) {
                return Ok(self.finish(StopReason::RepeatedConnector));
            }
            if let Some(active) = self.session.as_mut() {
                active.last_take = Some(here);
            }
            return Ok(TravelAction::TakeConnector(connector));
        }
        Ok(match self.step_on_level(world, connector) {
            Ok(PathStep::Step { direction, .. }) => TravelAction::Move(direction),
            Ok(PathStep::Arrived) => TravelAction::TakeConnector(connector),
            Err(_) => self.finish(StopReason::NoPath),
        })
    }

    fn plan_route(
        &mut self,
        world: &impl TravelWorld,
        here: LevelPos,
        target: LevelPos,
        origin: LevelId,
        check_detours: bool,
    ) -> Result<RoutePlan, TravelError> {
        self.refresh_stale_levels(world);
        let agent = world.agent();
        let empty = ExclusionSet::new();

        let mut have_target_grid = false;
        if target.pos.is_known()
            && let Some(view) = world.level_view(target.level)
        {
            let oracle = oracle_on(&self.cache, &self.options, &empty, view, agent, target.level);
            self.target_grid.clone_from(self.pathfinder.distances_from(&oracle, target.pos));
            have_target_grid = true;
        }

        let view = view_of(world, here.level)?;
        let oracle = oracle_on(&self.cache, &self.options, &empty, view, agent, here.level);
        let here_grid = self.pathfinder.distances_from(&oracle, here.pos);
        let request = RouteRequest {
            source: here,
            target,
            origin,
            stair_cost: self.options.stair_cost,
            here: here_grid,
            target_grid: have_target_grid.then_some(&self.target_grid),
            check_detours,
        };
        Ok(self.planner.plan(&self.cache, &self.branches, &request))
    }

    fn explore_action(
        &mut self,
        world: &impl TravelWorld,
        session: &TravelSession,
        greedy: bool,
    ) -> Result<TravelAction, TravelError> {
        let level = world.current_level();
        let origin = world.agent_pos();
        let view = view_of(world, level)?;
        let autopickup = self.options.autopickup;
        if greedy && view.needs_visit(origin, autopickup) {
            return Ok(self.finish(StopReason::ReachedItem(origin)));
        }

        let kept = session
            .explore_target
            .filter(|t| t.pos != origin && is_target_still_valid(view, t, autopickup));
        if let Some(target) = kept
            && let Ok(PathStep::Step { direction, .. }) = self.step_on_level(world, target.pos)
        {
            return Ok(TravelAction::Move(direction));
        }

        let empty = ExclusionSet::new();
        let oracle = oracle_on(&self.cache, &self.options, &empty, view, world.agent(), level);
        let request = ExploreRequest::from_options(&self.options, greedy);
        let target = match select_explore_target(&mut self.pathfinder, &oracle, origin, request) {
            ExploreOutcome::Target(target) => target,
            ExploreOutcome::FullyExplored => return Ok(self.finish(StopReason::FullyExplored)),
            ExploreOutcome::PartlyExplored => return Ok(self.finish(StopReason::PartlyExplored)),
        };
        tracing::debug!(
            target: "travel::explore",
            pos = %target.pos,
            kind = ?target.kind,
            distance = target.distance,
            "explore target chosen"
        );
        if let Some(active) = self.session.as_mut() {
            active.explore_target = Some(target);
        }
        Ok(match self.step_on_level(world, target.pos) {
            Ok(PathStep::Step { direction, .. }) => TravelAction::Move(direction),
            Ok(PathStep::Arrived) | Err(_) => self.finish(StopReason::NoPath),
        })
    }
}

/// Levels whose connector data mentions `level` as a destination.
pub fn levels_linking_to(cache: &TravelCache, level: LevelId) -> BTreeSet<LevelId> {
    cache
        .levels()
        .filter(|info| info.connectors().iter().any(|c| c.destination_level() == Some(level)))
        .map(LevelInfo::id)
        .collect()
}
