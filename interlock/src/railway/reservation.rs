use super::*;
use super::agent::{Agent, AgentKind, DeadlockTarget};
use super::clearing::ClearSection;
use super::network::Network;
use super::passing::PassingPaths;
use super::route::RouteElement;
use crate::input::layout::{CircuitType, ItemKind};
use crate::output::history::{InfLogger, InterlockingLogEvent};
use log::{debug, info};

use std::collections::BTreeMap;

/// Hooks into the wayside equipment driven by the interlocking. Signal
/// aspects are computed elsewhere; these calls only enable or reset them.
pub trait Wayside {
    /// `position` is 0 for the near exit and 1 for the far exit.
    fn throw_switch(&mut self, _junction: SectionId, _switch: usize, _position: usize) {}
    fn enable_signal(&mut self, _signal: SignalId, _agent: AgentId) {}
    fn enable_speed_post(&mut self, _post: usize, _agent: AgentId) {}
    fn reset_signal(&mut self, _signal: SignalId) {}
}

pub struct NoWayside;
impl Wayside for NoWayside {}

/// The reservation engine. Owns the network and the live agents; every
/// mutation goes through `&mut self`, one caller at a time.
pub struct Interlocking {
    pub network: Network,
    pub passing: PassingPaths,
    agents: BTreeMap<AgentId, Agent>,
    wayside: Box<dyn Wayside>,
    logger: InfLogger,
}

impl Interlocking {
    pub fn new(network: Network, wayside: Box<dyn Wayside>, logger: InfLogger) -> Interlocking {
        Interlocking {
            network,
            passing: PassingPaths::new(),
            agents: BTreeMap::new(),
            wayside,
            logger,
        }
    }

    fn log(&self, ev: InterlockingLogEvent) {
        (self.logger)(ev);
    }

    pub fn add_agent(&mut self, agent: Agent) -> Option<Agent> {
        debug!("Adding agent {} ({:?}, length {}).", agent.id, agent.kind, agent.length);
        self.agents.insert(agent.id, agent)
    }

    pub fn remove_agent(&mut self, id: AgentId) -> Option<Agent> {
        if self.agents.contains_key(&id) {
            self.clear_agent(id);
        }
        self.agents.remove(&id)
    }

    pub fn has_agent(&self, id: AgentId) -> bool {
        self.agents.contains_key(&id)
    }

    pub fn agent(&self, id: AgentId) -> &Agent {
        match self.agents.get(&id) {
            Some(a) => a,
            None => panic!("Unknown agent {}", id),
        }
    }

    pub fn agent_mut(&mut self, id: AgentId) -> &mut Agent {
        match self.agents.get_mut(&id) {
            Some(a) => a,
            None => panic!("Unknown agent {}", id),
        }
    }

    pub fn agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Route position and element of `section` ahead of the agent.
    fn element(&self, section: SectionId, agent: AgentId) -> Option<(usize, RouteElement)> {
        self.agent(agent).route_element(section).map(|(i, e)| (i, *e))
    }

    fn neighbours(&self, agent: AgentId, index: usize) -> (Option<SectionId>, Option<SectionId>) {
        let route = &self.agent(agent).route;
        let prev = if index > 0 { route.get(index - 1).map(|e| e.section) } else { None };
        (prev, route.get(index + 1).map(|e| e.section))
    }

    /// Whether `agent` may take `section` now. The checks run in a fixed
    /// order and the first conclusive one decides. A reservation held by an
    /// agent which has not yet started may be taken away from it here.
    pub fn is_available(&mut self, section: SectionId, agent: AgentId) -> bool {
        let requester_at_start = {
            let a = self.agent(agent);
            a.is_player() && a.route_index == 0
        };
        let (reserved_by, must_wait) = {
            let s = self.network.section(section);
            let st = &s.state;

            if st.is_occupied_by(agent) || st.is_reserved_by(agent) {
                return true;
            }

            if st.is_occupied_by_other(agent) {
                if !s.is_junction_like() || !self.junction_path_free(section, agent) {
                    return false;
                }
            }
            (st.reserved, self.agent(agent).must_wait_at(section))
        };

        if let Some(holder) = reserved_by {
            let holder_unstarted = self.agents.get(&holder).map(|h| h.is_unstarted_ai()).unwrap_or(false);
            if holder_unstarted || requester_at_start {
                self.displace(section, holder, agent);
            }
            return false;
        }

        {
            let st = &self.network.section(section).state;
            if let Some(sig) = st.signal_reserved {
                if self.agent(agent).signal_context != Some(sig) {
                    return false;
                }
            }
            if let Some(head) = st.claim_head() {
                if head != agent {
                    return false;
                }
            }
        }

        if self.network.section(section).deadlock.is_trapped(agent) {
            let dl = &mut self.network.section_mut(section).deadlock;
            if !dl.awaited.contains(&agent) {
                dl.await_release(agent);
                self.log(InterlockingLogEvent::Awaiting(section, agent));
            }
            return false;
        }

        if self.network.section(section).state.forced || must_wait {
            return false;
        }

        true
    }

    /// A second agent may use a junction-like section already occupied only
    /// through pins which are not aligned, towards a section which nobody
    /// else occupies.
    fn junction_path_free(&self, section: SectionId, agent: AgentId) -> bool {
        let (i, e) = match self.element(section, agent) {
            Some(x) => x,
            None => return false,
        };
        let s = self.network.section(section);
        let (prev, _) = self.neighbours(agent, i);
        let entry = prev.and_then(|p| s.exit_towards(e.direction.reverse(), p))
            .unwrap_or(Location::Near);
        if s.active_pin(e.direction.reverse(), entry).is_some() || s.active_pin(e.direction, e.exit()).is_some() {
            return false;
        }
        match s.pin(e.direction, e.exit()) {
            Some(p) => !self.network.section(p.link).state.is_occupied_by_other(agent),
            None => true,
        }
    }

    /// Removes `holder`'s reservation here and everything it holds further
    /// along its route.
    fn displace(&mut self, section: SectionId, holder: AgentId, by: AgentId) {
        info!("Agent {} displaced from section {} by agent {}.", holder, section, by);
        self.log(InterlockingLogEvent::Displaced(section, holder, by));
        let downstream: Vec<SectionId> = match self.agents.get(&holder) {
            Some(h) => match h.route_position(section) {
                Some(i) => h.route.elements()[i + 1..].iter().map(|e| e.section).collect(),
                None => Vec::new(),
            },
            None => Vec::new(),
        };
        self.unreserve(section, holder);
        for s in downstream {
            self.unreserve(s, holder);
            self.unclaim(s, holder);
        }
    }

    /// Reserves `section` for `agent`, aligning movable elements along its
    /// route and enabling the wayside items it will pass. Returns false if
    /// another agent holds the reservation.
    pub fn reserve(&mut self, section: SectionId, agent: AgentId) -> bool {
        {
            let st = &self.network.section(section).state;
            if st.is_reserved_by(agent) || st.is_occupied_by(agent) {
                return true;
            }
            if st.reserved.is_some() {
                return false;
            }
        }
        let element = self.element(section, agent);
        {
            let st = &mut self.network.section_mut(section).state;
            st.reserved = Some(agent);
            st.remove_claim(agent);
            st.remove_pre_reservation(agent);
        }
        self.log(InterlockingLogEvent::Reserved(section, agent, true));

        if let Some((i, e)) = element {
            if self.network.section(section).is_junction_like() {
                let (prev, next) = self.neighbours(agent, i);
                self.align_junction(section, agent, prev, next);
            }
            self.enable_items(section, e.direction, agent);
            self.arm_traps(section, agent, i);

            if let Some(alt) = e.start_alternative_path {
                if self.agent(agent).deadlock_info.contains_key(&alt.section) {
                    self.arm_traps(alt.section, agent, i);
                } else {
                    let dl = &mut self.network.section_mut(alt.section).deadlock;
                    if dl.is_trapped(agent) && !dl.awaited.contains(&agent) {
                        dl.await_release(agent);
                        self.log(InterlockingLogEvent::Awaiting(alt.section, agent));
                    }
                }
            }
        }
        true
    }

    fn align_junction(&mut self, section: SectionId, agent: AgentId, prev: Option<SectionId>, next: Option<SectionId>) {
        let (changed, kind, switch, exit, passing) = {
            let s = self.network.section_mut(section);
            let before = s.active_pins;
            let changed = s.align(agent, prev, next);
            // Adding a way next to ones already set leaves their routes intact.
            let kept = before.iter().flatten().any(|p| p.is_some())
                && before.iter().flatten().zip(s.active_pins.iter().flatten())
                    .all(|(b, a)| b.is_none() || b == a);
            let passing = if changed && !kept { ::std::mem::replace(&mut s.signals_passing, Vec::new()) } else { Vec::new() };
            (changed, s.kind, s.switch, s.alignment_exit(agent), passing)
        };
        if !changed {
            return;
        }
        for sig in passing {
            self.wayside.reset_signal(sig);
        }
        let aligned = self.network.section(section).aligned_exit();
        self.log(InterlockingLogEvent::Aligned(section, aligned));
        if let (CircuitType::Junction, Some(sw), Some(exit)) = (kind, switch, exit) {
            debug!("Throwing switch {} at section {} to {:?}.", sw, section, exit);
            self.wayside.throw_switch(section, sw, exit.index());
            self.log(InterlockingLogEvent::Switch(sw, exit));
        }
    }

    /// The agent no longer holds `section`. An emptied junction or crossover
    /// is reset; otherwise only the agent's way through it is dropped.
    fn release_junction(&mut self, section: SectionId, agent: AgentId) {
        let (empty, changed) = {
            let s = self.network.section_mut(section);
            if !s.is_junction_like() || s.state.is_set(agent, false) {
                return;
            }
            if s.state.is_occupied() || s.state.reserved.is_some() {
                (false, s.release_alignment(agent))
            } else {
                (true, false)
            }
        };
        if empty {
            self.reset_junction(section);
        } else if changed {
            let aligned = self.network.section(section).aligned_exit();
            self.log(InterlockingLogEvent::Aligned(section, aligned));
        }
    }

    fn reset_junction(&mut self, section: SectionId) {
        let passing = {
            let s = self.network.section_mut(section);
            s.de_align();
            ::std::mem::replace(&mut s.signals_passing, Vec::new())
        };
        for sig in passing {
            self.wayside.reset_signal(sig);
        }
        self.log(InterlockingLogEvent::Aligned(section, None));
    }

    fn enable_items(&mut self, section: SectionId, direction: Direction, agent: AgentId) {
        let kinds: Vec<ItemKind> = self.network.section(section)
            .directional_items(direction).map(|i| i.kind).collect();
        for k in kinds {
            match k {
                ItemKind::Signal(sig) => self.wayside.enable_signal(sig, agent),
                ItemKind::SpeedPost(p) => self.wayside.enable_speed_post(p, agent),
                ItemKind::MilePost(_) => {}
            }
        }
    }

    /// Arms the traps planned for `agent` at `section`: each partner whose
    /// path converges at an end section still ahead on the route, and which
    /// does not hold that end section yet, is trapped there.
    fn arm_traps(&mut self, section: SectionId, agent: AgentId, from: usize) {
        let targets = match self.agent(agent).deadlock_info.get(&section) {
            Some(t) => t.clone(),
            None => return,
        };
        for t in targets {
            if self.agent(agent).route.get_route_index(t.end_section, from).is_none() {
                continue;
            }
            if self.network.section(t.end_section).state.is_set(t.partner, false) {
                continue;
            }
            self.set_deadlock_trap(t.end_section, agent, t.partner);
        }
    }

    /// Queues `agent` for `section`. Returns false if it was already queued.
    pub fn claim(&mut self, section: SectionId, agent: AgentId) -> bool {
        if !self.network.section_mut(section).state.enqueue_claim(agent) {
            return false;
        }
        self.log(InterlockingLogEvent::Claimed(section, agent, true));
        let from = {
            let a = self.agent(agent);
            a.route_position(section).unwrap_or(a.route_index)
        };
        self.arm_traps(section, agent, from);
        true
    }

    /// Lowest priority request. Taken up as soon as the section is free.
    pub fn pre_reserve(&mut self, section: SectionId, agent: AgentId) {
        {
            let st = &mut self.network.section_mut(section).state;
            if st.is_set(agent, false) || !st.enqueue_pre_reservation(agent) {
                return;
            }
        }
        self.log(InterlockingLogEvent::PreReserved(section, agent, true));
        self.promote_pre_reservation(section);
    }

    fn promote_pre_reservation(&mut self, section: SectionId) {
        loop {
            let head = {
                let st = &self.network.section(section).state;
                if !st.is_free() || !st.claimed.is_empty() {
                    return;
                }
                match st.pre_reserved.front() {
                    Some(a) => *a,
                    None => return,
                }
            };
            if self.agents.contains_key(&head) {
                debug!("Promoting pre-reservation of agent {} at section {}.", head, section);
                self.reserve(section, head);
                return;
            }
            self.network.section_mut(section).state.remove_pre_reservation(head);
        }
    }

    /// The agent has physically entered the section. Schedules its release
    /// at the cumulative distance where the rear (plus overlap) has cleared.
    pub fn set_occupied(&mut self, section: SectionId, agent: AgentId, distance_travelled: Dist) {
        let element = self.element(section, agent);
        let direction = element.map(|(_, e)| e.direction).unwrap_or(self.agent(agent).front.direction);
        let (released, signal) = {
            let s = self.network.section_mut(section);
            let st = &mut s.state;
            st.occupation.insert(agent, direction);
            st.remove_claim(agent);
            st.remove_pre_reservation(agent);
            s.deadlock.awaited.retain(|a| *a != agent);
            (st.reserved.take(), st.signal_reserved.take())
        };
        if let Some(holder) = released {
            self.log(InterlockingLogEvent::Reserved(section, holder, false));
        }
        if let Some(sig) = signal {
            self.log(InterlockingLogEvent::SignalReserved(section, sig, false));
        }
        self.log(InterlockingLogEvent::Occupied(section, agent, true));

        let clear_at = self.clearing_distance(section, agent, direction, distance_travelled, element.map(|x| x.1));
        {
            let a = self.agent_mut(agent);
            a.distance_travelled = distance_travelled;
            a.clearing.insert(ClearSection { distance: clear_at, section });
        }

        if let Some((i, e)) = element {
            if !self.agent(agent).must_wait_at(section) {
                self.arm_traps(section, agent, i);
            }
            if let (Some(_), Some(alt)) = (e.used_alternative_path, e.start_alternative_path) {
                self.arm_traps(alt.section, agent, i);
            }
        }
    }

    fn clearing_distance(&self, section: SectionId, agent: AgentId, direction: Direction,
                         distance: Dist, element: Option<RouteElement>) -> Dist {
        let a = self.agent(agent);
        let s = self.network.section(section);

        let facing = element.map(|e| e.facing_point).unwrap_or(false);
        let overlap = match s.kind {
            CircuitType::Crossover => if s.overlap > 0.0 { s.overlap } else { a.junction_overlap },
            CircuitType::Junction if facing => if s.overlap > 0.0 { s.overlap } else { a.junction_overlap },
            _ => a.standard_overlap,
        };
        let covered = |offset: Dist| -> Dist {
            let o = offset.max(0.0).min(s.length);
            match direction {
                Direction::Ahead => o,
                Direction::Reverse => s.length - o,
            }
        };

        let to_clear = if a.front.section == section {
            s.length - covered(a.front.offset) + a.length
        } else if a.rear.section == section {
            s.length - covered(a.rear.offset)
        } else {
            s.length + a.length
        };
        let watermark = distance + to_clear + overlap;
        match a.clearing.last_distance() {
            Some(last) if last > watermark => last,
            _ => watermark,
        }
    }

    /// Releases the agent's occupation. On a junction or crossover left
    /// empty the alignment is undone. A pending pre-reservation may follow.
    pub fn clear_occupied(&mut self, section: SectionId, agent: AgentId) -> bool {
        let (was, released) = {
            let s = self.network.section_mut(section);
            let was = s.state.occupation.remove(&agent).is_some();
            let released = if s.state.reserved == Some(agent) { s.state.reserved.take() } else { None };
            s.state.remove_claim(agent);
            (was, released)
        };
        if !was && released.is_none() {
            return false;
        }
        if was {
            self.log(InterlockingLogEvent::Occupied(section, agent, false));
        }
        if released.is_some() {
            self.log(InterlockingLogEvent::Reserved(section, agent, false));
        }
        if let Some(a) = self.agents.get_mut(&agent) {
            a.clearing.remove_section(section);
        }
        self.release_junction(section, agent);
        if was && self.leaves_contested_zone(section, agent) {
            self.clear_deadlock_trap(section, agent);
        }
        self.promote_pre_reservation(section);
        true
    }

    /// The agent has passed the end of a contested zone here and still holds
    /// a trap on it.
    fn leaves_contested_zone(&self, section: SectionId, agent: AgentId) -> bool {
        let ends_zone = match self.agents.get(&agent) {
            Some(a) => a.deadlock_info.values().flatten().any(|t| t.end_section == section),
            None => false,
        };
        ends_zone && self.network.section(section).deadlock.actives.contains(&agent)
    }

    pub fn unreserve(&mut self, section: SectionId, agent: AgentId) -> bool {
        {
            let st = &mut self.network.section_mut(section).state;
            if st.reserved != Some(agent) {
                return false;
            }
            st.reserved = None;
        }
        self.log(InterlockingLogEvent::Reserved(section, agent, false));
        self.release_junction(section, agent);
        self.promote_pre_reservation(section);
        true
    }

    pub fn unclaim(&mut self, section: SectionId, agent: AgentId) -> bool {
        if !self.network.section_mut(section).state.remove_claim(agent) {
            return false;
        }
        self.log(InterlockingLogEvent::Claimed(section, agent, false));
        self.promote_pre_reservation(section);
        true
    }

    /// Drops everything `agent` holds on `section`.
    pub fn remove_train(&mut self, section: SectionId, agent: AgentId) {
        self.clear_occupied(section, agent);
        self.unreserve(section, agent);
        self.unclaim(section, agent);
        if self.network.section_mut(section).state.remove_pre_reservation(agent) {
            self.log(InterlockingLogEvent::PreReserved(section, agent, false));
        }
    }

    /// Abandons every hold the agent has anywhere, including deadlock traps
    /// it has set or is waiting on.
    pub fn clear_agent(&mut self, agent: AgentId) {
        info!("Clearing all holds of agent {}.", agent);
        for section in 0..self.network.len() {
            let involved = {
                let s = self.network.section(section);
                s.state.agents().contains(&agent)
                    || s.deadlock.actives.contains(&agent)
                    || s.deadlock.awaited.contains(&agent)
                    || s.deadlock.is_trapped(agent)
            };
            if !involved {
                continue;
            }
            self.remove_train(section, agent);
            self.clear_deadlock_trap(section, agent);
            let dl = &mut self.network.section_mut(section).deadlock;
            dl.awaited.retain(|a| *a != agent);
            dl.traps.remove(&agent);
        }
        if let Some(a) = self.agents.get_mut(&agent) {
            a.clearing.clear();
        }
    }

    /// Replaces the agent's deadlock plan. Track that the agent and a partner
    /// will both run over in opposite directions is a contested zone;
    /// entering it traps the partner at the far end. A registered passing
    /// place inside the zone which is open to and long enough for either of
    /// the two splits it, and the partner is then held at the boundary where
    /// the paths meet again. Returns the number of targets planned.
    pub fn plan_deadlocks(&mut self, agent: AgentId) -> usize {
        let mut planned = Vec::new();
        if self.agent(agent).kind != AgentKind::Static {
            let partners: Vec<AgentId> = self.agents.values()
                .filter(|a| a.id != agent && a.kind != AgentKind::Static)
                .map(|a| a.id)
                .collect();
            for partner in partners {
                for (entry, end_section) in self.contested_zones(agent, partner) {
                    debug!("Agent {} entering at section {} traps agent {} at section {}.",
                           agent, entry, partner, end_section);
                    planned.push((entry, DeadlockTarget { partner, end_section }));
                }
            }
        }
        let a = self.agent_mut(agent);
        a.deadlock_info.clear();
        for (entry, target) in planned {
            a.add_deadlock_target(entry, target);
        }
        a.deadlock_info.values().map(|t| t.len()).sum()
    }

    /// `(entry, end)` sections of the zones ahead of `agent` which `partner`
    /// runs over the other way.
    fn contested_zones(&self, agent: AgentId, partner: AgentId) -> Vec<(SectionId, SectionId)> {
        let a = self.agent(agent);
        let p = self.agent(partner);
        let route = &a.route;
        let opposing = |i: usize| -> bool {
            let e = &route[i];
            match p.route.get_route_index(e.section, p.route_index) {
                Some(j) => p.route[j].direction != e.direction,
                None => false,
            }
        };

        let mut zones = Vec::new();
        let mut i = a.route_index;
        while i < route.len() {
            if !opposing(i) {
                i += 1;
                continue;
            }
            let first = i;
            while i + 1 < route.len() && opposing(i + 1) {
                i += 1;
            }
            let last = i;

            let mut entry = first;
            let mut k = first;
            while k < last {
                match self.passing_place(agent, partner, k, last) {
                    Some(m) => {
                        zones.push((route[entry].section, route[k].section));
                        entry = m;
                        k = m;
                    }
                    None => k += 1,
                }
            }
            zones.push((route[entry].section, route[last].section));
            i += 1;
        }
        zones
    }

    /// Route index of the far boundary of a usable passing place starting at
    /// route index `k` and ending no later than `last`.
    fn passing_place(&self, agent: AgentId, partner: AgentId, k: usize, last: usize) -> Option<usize> {
        let a = self.agent(agent);
        let partner_length = self.agent(partner).length;
        let section = a.route[k].section;
        for &b in self.passing.at_section(section) {
            let boundary = match self.passing.get(b) {
                Some(x) => x,
                None => continue,
            };
            let other = if boundary.start == section { boundary.end } else { boundary.start };
            let m = match a.route.get_route_index(other, k + 1) {
                Some(m) if m <= last => m,
                _ => continue,
            };
            if self.passing.fits(boundary.start, boundary.end, agent, a.length)
                || self.passing.fits(boundary.start, boundary.end, partner, partner_length) {
                return Some(m);
            }
        }
        None
    }

    /// `agent` traps `partner` at the anchor `section`.
    pub fn set_deadlock_trap(&mut self, section: SectionId, agent: AgentId, partner: AgentId) -> bool {
        let set = self.network.section_mut(section).deadlock.set_trap(agent, partner);
        if set {
            debug!("Agent {} traps agent {} at section {}.", agent, partner, section);
            self.log(InterlockingLogEvent::Trap(section, agent, partner, true));
        }
        set
    }

    /// Lifts the traps `agent` has set at `section`. Returns the agents no
    /// longer trapped there.
    pub fn clear_deadlock_trap(&mut self, section: SectionId, agent: AgentId) -> Vec<AgentId> {
        let released = self.network.section_mut(section).deadlock.clear_trap(agent);
        for r in &released {
            self.log(InterlockingLogEvent::Trap(section, agent, *r, false));
        }
        released
    }

    /// True if some other agent is waiting for a trap at `section` to lift.
    pub fn check_deadlock_awaited(&self, section: SectionId, agent: AgentId) -> bool {
        self.network.section(section).deadlock.check_awaited(agent)
    }

    /// Holds a free section for a signal route. The signal is recorded as
    /// routed through the section.
    pub fn signal_reserve(&mut self, section: SectionId, signal: SignalId) -> bool {
        {
            let st = &mut self.network.section_mut(section).state;
            if st.signal_reserved == Some(signal) {
                return true;
            }
            if !st.is_free() {
                return false;
            }
            st.signal_reserved = Some(signal);
        }
        self.register_signal_route(section, signal);
        self.log(InterlockingLogEvent::SignalReserved(section, signal, true));
        true
    }

    pub fn clear_signal_reservation(&mut self, section: SectionId, signal: SignalId) -> bool {
        {
            let s = self.network.section_mut(section);
            if s.state.signal_reserved != Some(signal) {
                return false;
            }
            s.state.signal_reserved = None;
            s.signals_passing.retain(|x| *x != signal);
        }
        self.log(InterlockingLogEvent::SignalReserved(section, signal, false));
        self.promote_pre_reservation(section);
        true
    }

    /// Records a signal whose route passes through `section`; it is reset
    /// when the section is re-aligned or released.
    pub fn register_signal_route(&mut self, section: SectionId, signal: SignalId) {
        let s = self.network.section_mut(section);
        if !s.signals_passing.contains(&signal) {
            s.signals_passing.push(signal);
        }
    }

    pub fn set_forced(&mut self, section: SectionId, forced: bool) {
        self.network.section_mut(section).state.forced = forced;
    }

    /// Advances the agent to `distance` and releases every section whose
    /// clearing point has been passed. Returns the released sections.
    pub fn update_clearing(&mut self, agent: AgentId, distance: Dist) -> Vec<SectionId> {
        let due = {
            let a = self.agent_mut(agent);
            a.distance_travelled = distance;
            a.clearing.due(distance)
        };
        let mut cleared = Vec::new();
        for c in due {
            if self.clear_occupied(c.section, agent) {
                cleared.push(c.section);
            }
        }
        cleared
    }
}
