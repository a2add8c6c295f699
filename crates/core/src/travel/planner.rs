//! Interlevel route planning over the cached connector graphs.
//! This module exists to pick the connector the agent should head for next when the
//! destination lies on another level.
//! It does not flood levels itself; callers hand in the grids for the agent's level and the
//! target level, and everything else comes from the cached distance matrices.

use std::collections::{BTreeMap, VecDeque};

use slotmap::{SlotMap, new_key_type};

use super::*;

new_key_type! {
    pub struct RouteNodeId;
}

/// Connector `connector` on `level` is taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteLeg {
    pub level: LevelId,
    pub connector: Pos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    pub legs: Vec<RouteLeg>,
    /// Walking rounds plus one `stair_cost` per leg.
    pub cost: u32,
    /// First level on the route that lies off the direct branch path, if confirmation is wanted.
    pub detour: Option<LevelId>,
}

impl Route {
    pub fn first_connector(&self) -> Option<Pos> {
        self.legs.first().map(|leg| leg.connector)
    }

    pub fn levels(&self) -> impl Iterator<Item = LevelId> + '_ {
        self.legs.iter().map(|leg| leg.level)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RoutePlan {
    Found(Route),
    /// No full route is known; `route` gets closer to the target by way of `toward`.
    Fallback { toward: LevelId, route: Route },
    Unreachable { target: LevelId, target_known: bool },
}

impl RoutePlan {
    pub fn route(&self) -> Option<&Route> {
        match self {
            RoutePlan::Found(route) | RoutePlan::Fallback { route, .. } => Some(route),
            RoutePlan::Unreachable { .. } => None,
        }
    }

    pub fn first_connector(&self) -> Option<Pos> {
        self.route().and_then(Route::first_connector)
    }

    /// Any usable route, or the error explaining why none exists.
    pub fn into_result(self) -> Result<Route, TravelError> {
        match self {
            RoutePlan::Found(route) | RoutePlan::Fallback { route, .. } => Ok(route),
            RoutePlan::Unreachable { target, target_known: false } => {
                Err(TravelError::PartiallyUnknown(target))
            }
            RoutePlan::Unreachable { target_known: true, .. } => Err(TravelError::NoPath),
        }
    }
}

pub struct RouteRequest<'a> {
    /// Where the agent stands.
    pub source: LevelPos,
    pub target: LevelPos,
    /// Level the trip started from, used for the detour check.
    pub origin: LevelId,
    pub stair_cost: u32,
    /// Distances from the agent on its own level.
    pub here: &'a DistanceGrid,
    /// Distances from the target position on the target level, when that level is known.
    pub target_grid: Option<&'a DistanceGrid>,
    pub check_detours: bool,
}

#[derive(Clone, Copy, Debug)]
struct RouteNode {
    level: LevelId,
    /// Landing position; `None` for the agent's own position.
    entry: Option<Pos>,
    cost: u32,
    parent: Option<RouteNodeId>,
    /// Leg taken from the parent's level to land here.
    via: Option<RouteLeg>,
}

#[derive(Clone, Debug)]
struct Candidate {
    node: RouteNodeId,
    /// Leg past the node that ends the route, if any.
    last: Option<RouteLeg>,
    cost: u32,
}

/// Owns the search arena so repeated plans don't reallocate.
#[derive(Debug, Default)]
pub struct RoutePlanner {
    arena: SlotMap<RouteNodeId, RouteNode>,
    best: BTreeMap<(LevelId, Pos), u32>,
    worklist: VecDeque<RouteNodeId>,
}

impl RoutePlanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(
        &mut self,
        cache: &TravelCache,
        branches: &BranchTable,
        request: &RouteRequest<'_>,
    ) -> RoutePlan {
        self.arena.clear();
        self.best.clear();
        self.worklist.clear();

        let target = request.target;
        let target_known = cache.has_level(target.level);
        let unknown_landing_ok = !target.pos.is_known()
            && cache.level(target.level).is_none_or(|info| !info.exclusions().has_hard_zones());

        let root = self.arena.insert(RouteNode {
            level: request.source.level,
            entry: None,
            cost: 0,
            parent: None,
            via: None,
        });
        self.worklist.push_back(root);

        let mut found: Option<Candidate> = None;
        // (level distance to target, level, candidate)
        let mut closer: Option<(u32, LevelId, Candidate)> = None;
        let mut offer_fallback = |level: LevelId, candidate: Candidate| {
            let Some(ld) = branches.level_distance(level, target.level) else {
                return;
            };
            let better = closer
                .as_ref()
                .is_none_or(|(best_ld, _, best)| (ld, candidate.cost) < (*best_ld, best.cost));
            if better {
                closer = Some((ld, level, candidate));
            }
        };

        while let Some(id) = self.worklist.pop_front() {
            let node = self.arena[id];
            if let Some(entry) = node.entry
                && self.best.get(&(node.level, entry)).is_some_and(|&best| best < node.cost)
            {
                continue;
            }

            if node.level == target.level {
                let remaining = if !target.pos.is_known() {
                    Some(0)
                } else {
                    match node.entry {
                        None => request.here.distance(target.pos),
                        Some(entry) => request.target_grid.and_then(|grid| grid.distance(entry)),
                    }
                };
                if let Some(remaining) = remaining {
                    let total = node.cost.saturating_add(remaining);
                    if found.as_ref().is_none_or(|best| total < best.cost) {
                        found = Some(Candidate { node: id, last: None, cost: total });
                    }
                    continue;
                }
            }
            // Landing on the target level without a known way to the cell still counts as closer.
            if node.entry.is_some() {
                offer_fallback(node.level, Candidate { node: id, last: None, cost: node.cost });
            }

            let Some(info) = cache.level(node.level) else {
                continue;
            };
            let entry_index = node.entry.and_then(|entry| info.connector_index(entry));
            for (index, connector) in info.connectors().iter().enumerate() {
                if connector.state == ConnectorState::Placeholder {
                    continue;
                }
                let walk = match node.entry {
                    None => request.here.distance(connector.pos),
                    Some(entry) if entry == connector.pos => Some(0),
                    Some(_) => entry_index.and_then(|from| info.distance_between(from, index)),
                };
                let Some(walk) = walk else {
                    continue;
                };
                let Some(destination) = connector.destination else {
                    continue;
                };
                if connector.kind.is_one_way() && destination.level != target.level {
                    continue;
                }

                let cost = node.cost.saturating_add(walk).saturating_add(request.stair_cost);
                let leg = RouteLeg { level: node.level, connector: connector.pos };

                if !destination.is_resolved() {
                    let candidate = Candidate { node: id, last: Some(leg), cost };
                    if destination.level == target.level && unknown_landing_ok {
                        if found.as_ref().is_none_or(|best| cost < best.cost) {
                            found = Some(candidate);
                        }
                    } else {
                        offer_fallback(destination.level, candidate);
                    }
                    continue;
                }

                let key = (destination.level, destination.pos);
                if self.best.get(&key).is_some_and(|&best| best <= cost) {
                    continue;
                }
                self.best.insert(key, cost);
                let child = self.arena.insert(RouteNode {
                    level: destination.level,
                    entry: Some(destination.pos),
                    cost,
                    parent: Some(id),
                    via: Some(leg),
                });
                self.worklist.push_back(child);
            }
        }

        if let Some(candidate) = found {
            let mut route = self.route_for(&candidate);
            if request.check_detours {
                route.detour = detour_level(branches, request.origin, target.level, &route);
            }
            tracing::debug!(
                target: "travel::planner",
                legs = route.legs.len(),
                cost = route.cost,
                detour = ?route.detour,
                "route found"
            );
            return RoutePlan::Found(route);
        }

        let here_ld = branches.level_distance(request.source.level, target.level);
        if let Some((ld, toward, candidate)) = closer
            && here_ld.is_none_or(|here| ld < here)
        {
            let route = self.route_for(&candidate);
            tracing::debug!(
                target: "travel::planner",
                toward = %toward,
                legs = route.legs.len(),
                "no full route, falling back to a closer level"
            );
            return RoutePlan::Fallback { toward, route };
        }

        tracing::debug!(target: "travel::planner", target = %target.level, "no route");
        RoutePlan::Unreachable { target: target.level, target_known }
    }

    fn route_for(&self, candidate: &Candidate) -> Route {
        let mut legs: Vec<RouteLeg> = candidate.last.into_iter().collect();
        let mut cursor = Some(candidate.node);
        while let Some(id) = cursor {
            let node = &self.arena[id];
            if let Some(via) = node.via {
                legs.push(via);
            }
            cursor = node.parent;
        }
        legs.reverse();
        Route { legs, cost: candidate.cost, detour: None }
    }
}

/// First level on the route that is farther from both ends than the ends are from each other.
fn detour_level(
    branches: &BranchTable,
    origin: LevelId,
    target: LevelId,
    route: &Route,
) -> Option<LevelId> {
    let direct = branches.level_distance(origin, target)?;
    route.levels().skip(1).find(|&level| {
        let there = branches.level_distance(origin, level);
        let onward = branches.level_distance(level, target);
        matches!((there, onward), (Some(a), Some(b)) if a + b > direct)
    })
}
