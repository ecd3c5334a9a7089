//! Turns an abstract waypoint path into route legs.
//!
//! The path is walked along the pins of the network, cut at each reversal
//! and at each point where a leg revisits one of its own sections. The last
//! leg is trimmed if it ends on a short unprotected stub, and alternative
//! paths are checked against the legs and registered as passing paths.

use super::*;
use super::network::Network;
use super::passing::{Authorization, PassingPath, PassingPaths, PathKind};
use super::route::{AlternativePathRef, ReversalInfo, Route};
use crate::input::layout::CircuitType;
use log::{debug, info, warn};
use smallvec::{smallvec, SmallVec};

use std::collections::{HashSet, VecDeque};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum WaypointKind {
    Start,
    Via,
    /// Leave the junction through this exit.
    Junction(Location),
    Reversal,
    /// Wait for the given number of seconds.
    Wait(f64),
    Stop,
    End,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Waypoint {
    pub section: SectionId,
    /// Direction of arrival. Required on the start waypoint.
    pub direction: Option<Direction>,
    /// From the near end; `None` means the end of the section reached last.
    pub offset: Option<Dist>,
    pub kind: WaypointKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlternativeSpec {
    pub name: String,
    pub from: SectionId,
    pub to: SectionId,
    /// Exits taken at facing junctions; `Near` elsewhere.
    pub choices: Vec<(SectionId, Location)>,
    pub authorization: Vec<Authorization>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbstractPath {
    pub waypoints: Vec<Waypoint>,
    pub alternatives: Vec<AlternativeSpec>,
}

#[derive(Copy, Clone, Debug)]
pub struct BuilderConfig {
    pub agent_length: Dist,
    pub clearing_margin: Dist,
    pub max_steps: usize,
}

impl Default for BuilderConfig {
    fn default() -> BuilderConfig {
        BuilderConfig { agent_length: 100.0, clearing_margin: 20.0, max_steps: 10_000 }
    }
}

#[derive(Debug, Fail)]
pub enum BuildError {
    #[fail(display = "path has no waypoints")]
    Empty,
    #[fail(display = "start waypoint at section {} has no direction", _0)]
    NoDirection(SectionId),
    #[fail(display = "unknown section {}", _0)]
    UnknownSection(SectionId),
    #[fail(display = "section {} cannot be reached from section {}", _1, _0)]
    Unreachable(SectionId, SectionId),
    #[fail(display = "path search exceeded {} steps", _0)]
    TooLong(usize),
}

#[derive(Clone, Debug, PartialEq)]
pub struct WaitingPoint {
    pub leg: usize,
    pub index: usize,
    pub section: SectionId,
    pub offset: Option<Dist>,
    /// `None` for a stop without a set duration.
    pub duration: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlternativePath {
    pub name: String,
    pub leg: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub boundary: usize,
    pub path_index: usize,
    pub route: Route,
    pub useful_length: Dist,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoutePath {
    pub legs: Vec<Route>,
    /// One per boundary between consecutive legs.
    pub reversals: Vec<ReversalInfo>,
    pub waiting_points: Vec<WaitingPoint>,
    pub alternative_paths: Vec<AlternativePath>,
}

impl RoutePath {
    /// All sections of all legs in order.
    pub fn sections(&self) -> Vec<SectionId> {
        self.legs.iter().flat_map(|l| l.sections()).collect()
    }
}

type Leg = Vec<(SectionId, Direction)>;

#[derive(Copy, Clone, Debug, PartialEq)]
enum Gap {
    /// Covered length of the reversal section.
    Reversal(Dist),
    Loop,
}

pub fn build(net: &Network, path: &AbstractPath, config: &BuilderConfig,
             passing: &mut PassingPaths) -> Result<RoutePath, BuildError> {
    let start = path.waypoints.first().ok_or(BuildError::Empty)?;
    for w in &path.waypoints {
        if w.section >= net.len() {
            return Err(BuildError::UnknownSection(w.section));
        }
    }
    let start_dir = start.direction.ok_or(BuildError::NoDirection(start.section))?;

    let mut legs: Vec<Leg> = vec![vec![(start.section, start_dir)]];
    let mut gaps = Vec::new();
    let mut waits = Vec::new();
    let mut forced = match start.kind {
        WaypointKind::Junction(l) => Some(l),
        _ => None,
    };

    for w in path.waypoints.iter().skip(1) {
        let (segment, prev) = {
            let leg = legs.last().map(|l| l.as_slice()).unwrap_or(&[]);
            let here = leg[leg.len() - 1];
            let prev = if leg.len() >= 2 { Some(leg[leg.len() - 2].0) } else { None };
            (find_segment(net, here, prev, forced, w, config.max_steps)?, prev)
        };
        debug!("Segment to section {} ({} sections, from {:?}).", w.section, segment.len(), prev);
        if let Some(leg) = legs.last_mut() {
            leg.extend(segment);
        }
        forced = None;

        let (leg_idx, idx, here) = {
            let leg = &legs[legs.len() - 1];
            (legs.len() - 1, leg.len() - 1, leg[leg.len() - 1])
        };
        match w.kind {
            WaypointKind::Junction(l) => forced = Some(l),
            WaypointKind::Wait(t) => waits.push(WaitingPoint {
                leg: leg_idx, index: idx, section: here.0, offset: w.offset, duration: Some(t),
            }),
            WaypointKind::Stop => waits.push(WaitingPoint {
                leg: leg_idx, index: idx, section: here.0, offset: w.offset, duration: None,
            }),
            WaypointKind::Reversal => {
                let length = net.length(here.0);
                let covered = match (w.offset, here.1) {
                    (None, _) => length,
                    (Some(o), Direction::Ahead) => o.max(0.0).min(length),
                    (Some(o), Direction::Reverse) => length - o.max(0.0).min(length),
                };
                gaps.push(Gap::Reversal(covered));
                legs.push(vec![(here.0, here.1.reverse())]);
            }
            WaypointKind::Start | WaypointKind::Via | WaypointKind::End => {}
        }
    }

    let (mut legs, gaps) = split_loops(legs, gaps, &mut waits);

    let last_leg = legs.len() - 1;
    if let Some(last) = legs.last_mut() {
        if trim_dangling(net, last, config) {
            let len = last.len();
            waits.retain(|w| w.leg != last_leg || w.index < len);
        }
    }

    let routes: Vec<Route> = legs.iter().map(|l| Route::from_sections(net, l)).collect();
    let mut reversals: Vec<ReversalInfo> = Vec::with_capacity(gaps.len());
    for (b, gap) in gaps.iter().enumerate() {
        let last = &routes[b];
        let index = last.len() - 1;
        let section = last[index].section;
        let info = match *gap {
            Gap::Loop => ReversalInfo::synthetic(index, section),
            Gap::Reversal(offset) => {
                let prev = reversals.last().and_then(|r: &ReversalInfo| r.first_divergence);
                ReversalInfo::new(net, last, prev, &routes[b + 1], offset, index, section)
            }
        };
        reversals.push(info);
    }

    let mut result = RoutePath { legs: routes, reversals, waiting_points: waits, alternative_paths: Vec::new() };
    for alt in &path.alternatives {
        register_alternative(net, &mut result, alt, config, passing);
    }

    info!("Built path of {} legs, {} sections, {} passing paths.",
          result.legs.len(), result.sections().len(), result.alternative_paths.len());
    Ok(result)
}

/// Possible next steps from a section. Facing junctions offer both exits
/// unless `choice` picks one.
fn successors(net: &Network, section: SectionId, direction: Direction,
              prev: Option<SectionId>, choice: Option<Location>) -> SmallVec<[(SectionId, Direction); 2]> {
    let s = net.section(section);
    let locations: SmallVec<[Location; 2]> = if s.is_facing(direction) {
        match choice {
            Some(l) => smallvec![l],
            None => smallvec![Location::Near, Location::Far],
        }
    } else {
        smallvec![s.exit_location(direction, prev, None)]
    };
    locations.into_iter()
        .filter_map(|l| s.pin(direction, l))
        .map(|p| (p.link, p.direction))
        .collect()
}

/// Breadth-first search from `from` to the waypoint. The returned sections
/// exclude `from` and end with the waypoint section.
fn find_segment(net: &Network, from: (SectionId, Direction), prev: Option<SectionId>,
                forced: Option<Location>, target: &Waypoint, max_steps: usize) -> Result<Leg, BuildError> {
    let reached = |s: SectionId, d: Direction| {
        s == target.section && target.direction.map(|t| t == d).unwrap_or(true)
    };
    if reached(from.0, from.1) {
        return Ok(Vec::new());
    }

    // (section, direction, previous section, parent node)
    let mut nodes: Vec<(SectionId, Direction, Option<SectionId>, Option<usize>)> =
        vec![(from.0, from.1, prev, None)];
    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(0);
    let mut steps = 0;

    while let Some(n) = queue.pop_front() {
        steps += 1;
        if steps > max_steps {
            return Err(BuildError::TooLong(max_steps));
        }
        let (section, direction, p, _) = nodes[n];
        let choice = if n == 0 { forced } else { None };
        for (next, d) in successors(net, section, direction, p, choice) {
            if !visited.insert((next, d, section)) {
                continue;
            }
            nodes.push((next, d, Some(section), Some(n)));
            let idx = nodes.len() - 1;
            if reached(next, d) {
                let mut out = Vec::new();
                let mut cur = Some(idx);
                while let Some(c) = cur {
                    if c == 0 { break; }
                    out.push((nodes[c].0, nodes[c].1));
                    cur = nodes[c].3;
                }
                out.reverse();
                return Ok(out);
            }
            queue.push_back(idx);
        }
    }
    Err(BuildError::Unreachable(from.0, target.section))
}

/// Cuts every leg at each section it revisits, so that no leg contains a
/// section twice. Waiting points follow their sections into the new legs.
fn split_loops(legs: Vec<Leg>, gaps: Vec<Gap>, waits: &mut Vec<WaitingPoint>) -> (Vec<Leg>, Vec<Gap>) {
    let mut out_legs: Vec<Leg> = Vec::new();
    let mut out_gaps = Vec::new();
    // per input leg: (output leg, first index covered)
    let mut pieces: Vec<Vec<(usize, usize)>> = Vec::new();

    for (li, leg) in legs.into_iter().enumerate() {
        if li > 0 {
            out_gaps.push(gaps[li - 1]);
        }
        let mut leg_pieces = Vec::new();
        let mut rest = leg;
        let mut base = 0;
        loop {
            let mut seen = HashSet::new();
            let revisit = rest.iter().position(|e| !seen.insert(e.0));
            match revisit {
                Some(k) => {
                    let tail = rest.split_off(k);
                    debug!("Leg {} revisits section {}; splitting.", li, tail[0].0);
                    leg_pieces.push((out_legs.len(), base));
                    out_legs.push(rest);
                    out_gaps.push(Gap::Loop);
                    base += k;
                    rest = tail;
                }
                None => {
                    leg_pieces.push((out_legs.len(), base));
                    out_legs.push(rest);
                    break;
                }
            }
        }
        pieces.push(leg_pieces);
    }

    for w in waits.iter_mut() {
        if let Some(&(leg, base)) = pieces[w.leg].iter().rev().find(|p| p.1 <= w.index) {
            w.leg = leg;
            w.index -= base;
        }
    }
    (out_legs, out_gaps)
}

/// Drops a short unprotected stub at the end of the last leg. Returns true
/// if the leg was shortened.
fn trim_dangling(net: &Network, leg: &mut Leg, config: &BuilderConfig) -> bool {
    let (section, direction) = match leg.last() {
        Some(x) => *x,
        None => return false,
    };
    let s = net.section(section);
    if s.end_signal(direction).is_some() || s.kind == CircuitType::EndOfTrack {
        return false;
    }

    // A signal reachable ahead without passing a junction protects the end.
    let mut cur = (section, direction);
    let mut prev = if leg.len() >= 2 { Some(leg[leg.len() - 2].0) } else { None };
    for _ in 0..config.max_steps {
        let cs = net.section(cur.0);
        if cs.is_facing(cur.1) {
            break;
        }
        let next = match cs.pin(cur.1, cs.exit_location(cur.1, prev, None)) {
            Some(p) => (p.link, p.direction),
            None => break,
        };
        prev = Some(cur.0);
        cur = next;
        let ns = net.section(cur.0);
        if ns.end_signal(cur.1).is_some() {
            return false;
        }
        if ns.is_junction_like() {
            break;
        }
    }

    let cut = match leg.iter().rposition(|&(s, d)| net.section(s).end_signal(d).is_some()) {
        Some(k) => k + 1,
        None => return false,
    };
    let trailing = &leg[cut..];
    let length: Dist = trailing.iter().map(|e| net.length(e.0)).sum();
    let junction = trailing.iter().any(|e| net.section(e.0).is_junction_like());
    if length < config.agent_length / 2.0 && !junction {
        debug!("Trimming {} dangling sections ({} length units).", trailing.len(), length);
        leg.truncate(cut);
        true
    } else {
        false
    }
}

/// Walks the alternative from its start in the direction of the leg.
fn walk_alternative(net: &Network, leg: &Route, start: usize, alt: &AlternativeSpec,
                    max_steps: usize) -> Option<Route> {
    let mut cur = (alt.from, leg[start].direction);
    let mut prev = if start > 0 { Some(leg[start - 1].section) } else { None };
    let mut seq = vec![cur];
    for _ in 0..max_steps {
        if cur.0 == alt.to && seq.len() > 1 {
            return Some(Route::from_sections(net, &seq));
        }
        let s = net.section(cur.0);
        let location = if s.is_facing(cur.1) {
            alt.choices.iter().find(|c| c.0 == cur.0).map(|c| c.1).unwrap_or(Location::Near)
        } else {
            s.exit_location(cur.1, prev, None)
        };
        let pin = s.pin(cur.1, location)?;
        prev = Some(cur.0);
        cur = (pin.link, pin.direction);
        seq.push(cur);
    }
    None
}

fn register_alternative(net: &Network, result: &mut RoutePath, alt: &AlternativeSpec,
                        config: &BuilderConfig, passing: &mut PassingPaths) {
    let found = result.legs.iter().enumerate().filter_map(|(li, leg)| {
        let i = leg.get_route_index(alt.from, 0)?;
        let j = leg.get_route_index(alt.to, i + 1)?;
        Some((li, i, j))
    }).next();
    let (li, i, j) = match found {
        Some(x) => x,
        None => {
            warn!("Passing path \"{}\": sections {} and {} are not on one leg; ignored.",
                  alt.name, alt.from, alt.to);
            return;
        }
    };

    let route = match walk_alternative(net, &result.legs[li], i, alt, config.max_steps) {
        Some(r) => r,
        None => {
            warn!("Passing path \"{}\" does not lead from section {} to {}; ignored.",
                  alt.name, alt.from, alt.to);
            return;
        }
    };
    if !result.legs[li].has_actual_diverge_path(&route, i) {
        warn!("Passing path \"{}\" does not diverge from the main path; ignored.", alt.name);
        return;
    }

    let main: Route = result.legs[li].elements()[i..=j].iter().cloned().collect();
    let main_useful = main.get_useful_length(net, config.clearing_margin, 0, None);
    let alt_useful = route.get_useful_length(net, config.clearing_margin, 0, None);

    let (boundary, _) = passing.register(alt.from, alt.to, PassingPath {
        name: format!("{}/main", alt.name),
        kind: PathKind::Main,
        path: main,
        useful_length: main_useful.length,
        end_section: alt.to,
        last_useful: main_useful.last_index,
        allowed: vec![Authorization::Public],
    });
    let (_, path_index) = passing.register(alt.from, alt.to, PassingPath {
        name: alt.name.clone(),
        kind: PathKind::Alternative,
        path: route.clone(),
        useful_length: alt_useful.length,
        end_section: alt.to,
        last_useful: alt_useful.last_index,
        allowed: alt.authorization.clone(),
    });

    let leg = &mut result.legs[li];
    leg.element_mut(i).start_alternative_path = Some(AlternativePathRef { path: boundary, section: alt.to });
    leg.element_mut(j).end_alternative_path = Some(AlternativePathRef { path: boundary, section: alt.from });

    debug!("Registered passing path \"{}\" between sections {} and {} (useful length {}).",
           alt.name, alt.from, alt.to, alt_useful.length);
    result.alternative_paths.push(AlternativePath {
        name: alt.name.clone(),
        leg: li,
        start_index: i,
        end_index: j,
        boundary,
        path_index,
        route,
        useful_length: alt_useful.length,
    });
}
