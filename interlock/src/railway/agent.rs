use super::*;
use super::clearing::ClearingQueue;
use super::route::{Route, RouteElement};

use std::collections::{BTreeMap, BTreeSet};

pub const DEFAULT_STANDARD_OVERLAP: Dist = 15.0;
pub const DEFAULT_JUNCTION_OVERLAP: Dist = 30.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AgentKind {
    Player,
    /// Computer controlled. Until `started`, its reservations yield to others.
    Ai { started: bool },
    Static,
}

/// A partner agent expected on a converging path, and the section where the
/// two paths meet.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DeadlockTarget {
    pub partner: AgentId,
    pub end_section: SectionId,
}

/// One end of the agent body.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Position {
    pub section: SectionId,
    /// From the near end of the section.
    pub offset: Dist,
    pub direction: Direction,
    pub route_index: Option<usize>,
}

impl Position {
    pub fn new(section: SectionId, offset: Dist, direction: Direction) -> Position {
        Position { section, offset, direction, route_index: None }
    }
}

/// Live state of a train, as supplied by the movement model.
#[derive(Clone, Debug)]
pub struct Agent {
    pub id: AgentId,
    pub kind: AgentKind,
    pub length: Dist,
    pub route: Route,
    pub route_index: usize,
    pub front: Position,
    pub rear: Position,
    pub distance_travelled: Dist,
    pub standard_overlap: Dist,
    pub junction_overlap: Dist,
    pub signal_context: Option<SignalId>,
    pub deadlock_info: BTreeMap<SectionId, Vec<DeadlockTarget>>,
    pub wait_sections: BTreeSet<SectionId>,
    pub clearing: ClearingQueue,
}

impl Agent {
    pub fn new(id: AgentId, kind: AgentKind, length: Dist, route: Route) -> Agent {
        let (section, direction) = route.first()
            .map(|e| (e.section, e.direction))
            .unwrap_or((0, Direction::Ahead));
        let at = Position { route_index: Some(0), ..Position::new(section, 0.0, direction) };
        Agent {
            id,
            kind,
            length,
            route,
            route_index: 0,
            front: at,
            rear: at,
            distance_travelled: 0.0,
            standard_overlap: DEFAULT_STANDARD_OVERLAP,
            junction_overlap: DEFAULT_JUNCTION_OVERLAP,
            signal_context: None,
            deadlock_info: BTreeMap::new(),
            wait_sections: BTreeSet::new(),
            clearing: ClearingQueue::new(),
        }
    }

    pub fn is_player(&self) -> bool {
        self.kind == AgentKind::Player
    }

    pub fn is_unstarted_ai(&self) -> bool {
        self.kind == AgentKind::Ai { started: false }
    }

    pub fn must_wait_at(&self, section: SectionId) -> bool {
        self.wait_sections.contains(&section)
    }

    /// Position of `section` on the route at or ahead of the agent.
    pub fn route_position(&self, section: SectionId) -> Option<usize> {
        self.route.get_route_index(section, self.route_index)
    }

    /// The element for `section` at or ahead of the agent.
    pub fn route_element(&self, section: SectionId) -> Option<(usize, &RouteElement)> {
        let i = self.route_position(section)?;
        Some((i, &self.route[i]))
    }

    pub fn add_deadlock_target(&mut self, section: SectionId, target: DeadlockTarget) {
        let targets = self.deadlock_info.entry(section).or_insert_with(Vec::new);
        if !targets.contains(&target) {
            targets.push(target);
        }
    }
}
