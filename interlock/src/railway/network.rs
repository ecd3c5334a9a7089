use super::*;
use super::state::{SectionState, DeadlockState};
use crate::input::layout::*;
use log::debug;

use std::collections::BTreeMap;

/// Neither half of a split section may be shorter than this.
pub const MIN_SECTION_LENGTH: Dist = 0.01;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Pin {
    pub link: SectionId,
    /// Direction of travel in the linked section.
    pub direction: Direction,
}

/// Indexed as `pins[direction][location]`: the connections used when leaving
/// the section travelling `direction`.
pub type Pins = [[Option<Pin>; 2]; 2];

#[derive(Debug, Fail)]
pub enum NetworkError {
    #[fail(display = "unknown section {}", _0)]
    UnknownSection(SectionId),
    #[fail(display = "section {} is of type {:?} and cannot be split", _0, _1)]
    NotSplittable(SectionId, CircuitType),
    #[fail(display = "section {} is in use and cannot be split", _0)]
    InUse(SectionId),
    #[fail(display = "no pin at section {} {:?} {:?}", _0, _1, _2)]
    NoPin(SectionId, Direction, Location),
    #[fail(display = "pin at section {} {:?} {:?} has no reciprocal", _0, _1, _2)]
    NotReciprocal(SectionId, Direction, Location),
}

#[derive(Debug, Clone)]
pub struct Section {
    pub index: SectionId,
    pub kind: CircuitType,
    pub length: Dist,
    pub pins: Pins,
    pub active_pins: Pins,
    /// Pins set on a movable element per agent; `active_pins` is their union.
    pub alignments: BTreeMap<AgentId, Pins>,
    pub overlap: Dist,
    pub switch: Option<usize>,
    pub end_signals: [Option<SignalId>; 2],
    pub items: Vec<TrackItem>,
    pub annotations: Vec<Annotation>,
    /// Signals whose cleared route runs through this section.
    pub signals_passing: Vec<SignalId>,
    pub state: SectionState,
    pub deadlock: DeadlockState,
}

impl Section {
    pub fn new(index: SectionId, kind: CircuitType, length: Dist) -> Section {
        Section {
            index,
            kind,
            length,
            pins: [[None; 2]; 2],
            active_pins: [[None; 2]; 2],
            alignments: BTreeMap::new(),
            overlap: 0.0,
            switch: None,
            end_signals: [None; 2],
            items: Vec::new(),
            annotations: Vec::new(),
            signals_passing: Vec::new(),
            state: SectionState::default(),
            deadlock: DeadlockState::default(),
        }
    }

    pub fn pin(&self, d: Direction, l: Location) -> Option<Pin> {
        self.pins[d.index()][l.index()]
    }

    pub fn active_pin(&self, d: Direction, l: Location) -> Option<Pin> {
        self.active_pins[d.index()][l.index()]
    }

    pub fn is_junction_like(&self) -> bool {
        match self.kind {
            CircuitType::Junction | CircuitType::Crossover => true,
            _ => false,
        }
    }

    pub fn exit_count(&self, d: Direction) -> usize {
        self.pins[d.index()].iter().filter(|p| p.is_some()).count()
    }

    /// A junction traversed in the direction where it offers two exits.
    pub fn is_facing(&self, d: Direction) -> bool {
        self.kind == CircuitType::Junction && self.exit_count(d) == 2
    }

    pub fn facing_direction(&self) -> Option<Direction> {
        Direction::both().iter().cloned().find(|d| self.is_facing(*d))
    }

    pub fn exit_towards(&self, d: Direction, target: SectionId) -> Option<Location> {
        Location::both().iter().cloned()
            .find(|l| self.pin(d, *l).map(|p| p.link) == Some(target))
    }

    /// Exit used when leaving in `d`, given the section we came from and an
    /// optional explicit junction choice.
    pub fn exit_location(&self, d: Direction, prev: Option<SectionId>, choice: Option<Location>) -> Location {
        match self.kind {
            CircuitType::Junction if self.is_facing(d) => choice.unwrap_or(Location::Near),
            CircuitType::Crossover => {
                prev.and_then(|p| self.exit_towards(d.reverse(), p))
                    .or(choice)
                    .unwrap_or(Location::Near)
            }
            _ => Location::Near,
        }
    }

    pub fn end_signal(&self, d: Direction) -> Option<SignalId> {
        self.end_signals[d.index()]
    }

    /// Signals and speed posts facing `d`.
    pub fn directional_items(&self, d: Direction) -> impl Iterator<Item = &TrackItem> {
        self.items.iter().filter(move |i| {
            i.direction == Some(d) && match i.kind {
                ItemKind::Signal(_) | ItemKind::SpeedPost(_) => true,
                ItemKind::MilePost(_) => false,
            }
        })
    }

    pub fn refresh_end_signals(&mut self) {
        for d in Direction::both().iter().cloned() {
            let mut best: Option<(SignalId, Dist)> = None;
            for item in &self.items {
                if let (ItemKind::Signal(sig), Some(dir)) = (item.kind, item.direction) {
                    if dir != d { continue; }
                    let better = match best {
                        None => true,
                        Some((_, o)) => match d {
                            Direction::Ahead => item.offset > o,
                            Direction::Reverse => item.offset < o,
                        },
                    };
                    if better { best = Some((sig, item.offset)); }
                }
            }
            self.end_signals[d.index()] = best.map(|(s, _)| s);
        }
    }

    /// Plain sections always mirror their pins; movable elements start unaligned.
    pub fn reset_active_pins(&mut self) {
        if self.is_junction_like() {
            self.active_pins = [[None; 2]; 2];
        } else {
            self.active_pins = self.pins;
        }
    }

    /// Pins used when passing through from `prev` to `next`.
    pub fn route_pins(&self, prev: Option<SectionId>, next: Option<SectionId>) -> Pins {
        let mut pins = [[None; 2]; 2];
        for d in Direction::both().iter() {
            for l in Location::both().iter() {
                if let Some(p) = self.pin(*d, *l) {
                    if Some(p.link) == prev || Some(p.link) == next {
                        pins[d.index()][l.index()] = Some(p);
                    }
                }
            }
        }
        pins
    }

    /// Sets the agent's way through the movable element towards the given
    /// neighbours. Ways set for other agents stay. Returns true if the
    /// combined alignment changed.
    pub fn align(&mut self, agent: AgentId, prev: Option<SectionId>, next: Option<SectionId>) -> bool {
        let pins = self.route_pins(prev, next);
        self.alignments.insert(agent, pins);
        self.merge_alignments()
    }

    /// Drops the agent's way. Returns true if the combined alignment changed.
    pub fn release_alignment(&mut self, agent: AgentId) -> bool {
        if self.alignments.remove(&agent).is_none() {
            return false;
        }
        self.merge_alignments()
    }

    fn merge_alignments(&mut self) -> bool {
        let mut active: Pins = [[None; 2]; 2];
        for pins in self.alignments.values() {
            for d in 0..2 {
                for l in 0..2 {
                    if pins[d][l].is_some() {
                        active[d][l] = pins[d][l];
                    }
                }
            }
        }
        let changed = active != self.active_pins;
        self.active_pins = active;
        changed
    }

    pub fn de_align(&mut self) {
        if self.is_junction_like() {
            self.alignments.clear();
            self.active_pins = [[None; 2]; 2];
        }
    }

    /// The exit currently set on the facing side of a junction.
    pub fn aligned_exit(&self) -> Option<Location> {
        facing_exit(self, &self.active_pins)
    }

    /// The facing exit set for one agent.
    pub fn alignment_exit(&self, agent: AgentId) -> Option<Location> {
        facing_exit(self, self.alignments.get(&agent)?)
    }
}

fn facing_exit(s: &Section, pins: &Pins) -> Option<Location> {
    let d = s.facing_direction()?;
    Location::both().iter().cloned().find(|l| pins[d.index()][l.index()].is_some())
}

#[derive(Debug, Clone, Default)]
pub struct Network {
    pub sections: Vec<Section>,
}

impl Network {
    pub fn new(layout: &TrackLayout) -> Result<Network, NetworkError> {
        let sections = layout.sections.iter().enumerate().map(|(i, spec)| {
            let mut s = Section::new(i, spec.kind, spec.length);
            s.overlap = spec.overlap;
            s.switch = spec.switch;
            s
        }).collect();
        let mut net = Network { sections };

        for link in &layout.links {
            net.link(link)?;
        }
        for spec in &layout.items {
            net.sections.get_mut(spec.section)
                .ok_or(NetworkError::UnknownSection(spec.section))?
                .items.push(spec.item);
        }
        for &(idx, annotation) in &layout.annotations {
            net.sections.get_mut(idx)
                .ok_or(NetworkError::UnknownSection(idx))?
                .annotations.push(annotation);
        }
        for s in net.sections.iter_mut() {
            s.refresh_end_signals();
            s.reset_active_pins();
        }

        for seam in &layout.seams {
            net.insert_boundary_node(*seam)?;
        }
        for x in &layout.crossovers {
            let shape = x.shape.and_then(|i| layout.shapes.get(i));
            net.add_crossover_junction(x.first, x.second, shape)?;
        }

        debug!("Network built with {} sections.", net.sections.len());
        Ok(net)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section(&self, idx: SectionId) -> &Section {
        match self.sections.get(idx) {
            Some(s) => s,
            None => panic!("Unknown section {}", idx),
        }
    }

    pub fn section_mut(&mut self, idx: SectionId) -> &mut Section {
        match self.sections.get_mut(idx) {
            Some(s) => s,
            None => panic!("Unknown section {}", idx),
        }
    }

    pub fn length(&self, idx: SectionId) -> Dist {
        self.section(idx).length
    }

    pub fn link(&mut self, link: &Link) -> Result<(), NetworkError> {
        let (f, t) = (link.from, link.to);
        for s in &[f.section, t.section] {
            if *s >= self.sections.len() {
                return Err(NetworkError::UnknownSection(*s));
            }
        }
        self.set_pin(f, Pin { link: t.section, direction: t.direction });
        self.set_pin(PinRef { direction: t.direction.reverse(), ..t },
                     Pin { link: f.section, direction: f.direction.reverse() });
        Ok(())
    }

    fn set_pin(&mut self, at: PinRef, pin: Pin) {
        let s = self.section_mut(at.section);
        let (d, l) = (at.direction.index(), at.location.index());
        s.pins[d][l] = Some(pin);
        if !s.is_junction_like() || s.active_pins[d][l].is_some() {
            s.active_pins[d][l] = Some(pin);
        }
    }

    /// The slot on the linked section which points back through `at`.
    pub fn reciprocal_location(&self, at: PinRef) -> Option<Location> {
        let pin = self.sections.get(at.section)?.pin(at.direction, at.location)?;
        let target = self.sections.get(pin.link)?;
        let back = Pin { link: at.section, direction: at.direction.reverse() };
        Location::both().iter().cloned()
            .find(|l| target.pin(pin.direction.reverse(), *l) == Some(back))
    }

    /// Splits a plain section at `position` (from its near end). The original
    /// index keeps the near part, the far part gets a new index, which is
    /// returned.
    pub fn split(&mut self, idx: SectionId, position: Dist) -> Result<SectionId, NetworkError> {
        let (kind, length, free) = match self.sections.get(idx) {
            Some(s) => (s.kind, s.length, s.state.is_free() && s.deadlock.is_empty()),
            None => return Err(NetworkError::UnknownSection(idx)),
        };
        if kind != CircuitType::Normal {
            return Err(NetworkError::NotSplittable(idx, kind));
        }
        if !free {
            return Err(NetworkError::InUse(idx));
        }

        let pos = if length <= 2.0 * MIN_SECTION_LENGTH {
            length / 2.0
        } else {
            position.max(MIN_SECTION_LENGTH).min(length - MIN_SECTION_LENGTH)
        };
        let new_idx = self.sections.len();

        // Neighbours beyond the far end must point at the new section.
        let far_end = self.section(idx).pins[Direction::Ahead.index()];
        let mut repoint = Vec::new();
        for l in Location::both().iter().cloned() {
            if far_end[l.index()].is_some() {
                let at = PinRef { section: idx, direction: Direction::Ahead, location: l };
                if let (Some(pin), Some(back)) = (far_end[l.index()], self.reciprocal_location(at)) {
                    repoint.push(PinRef { section: pin.link, direction: pin.direction.reverse(), location: back });
                }
            }
        }

        let mut far = Section::new(new_idx, CircuitType::Normal, length - pos);
        {
            let near = self.section_mut(idx);
            near.length = pos;
            far.overlap = near.overlap;
            far.pins[Direction::Ahead.index()] = far_end;
            far.pins[Direction::Reverse.index()][Location::Near.index()] =
                Some(Pin { link: idx, direction: Direction::Reverse });
            near.pins[Direction::Ahead.index()] =
                [Some(Pin { link: new_idx, direction: Direction::Ahead }), None];

            let items = ::std::mem::replace(&mut near.items, Vec::new());
            for mut item in items {
                if item.offset < pos {
                    near.items.push(item);
                } else {
                    item.offset = (item.offset - pos).max(0.0);
                    far.items.push(item);
                }
            }

            let annotations = ::std::mem::replace(&mut near.annotations, Vec::new());
            for a in annotations {
                match a.kind {
                    AnnotationKind::Platform(_) => {
                        if a.start < pos {
                            near.annotations.push(Annotation { end: a.end.min(pos), ..a });
                        } else {
                            far.annotations.push(Annotation { start: a.start - pos, end: a.end - pos, ..a });
                        }
                    }
                    AnnotationKind::Tunnel | AnnotationKind::Trough => {
                        if a.start < pos {
                            near.annotations.push(Annotation { end: a.end.min(pos), ..a });
                        }
                        if a.end > pos {
                            far.annotations.push(Annotation {
                                start: (a.start - pos).max(0.0),
                                end: a.end - pos,
                                ..a
                            });
                        }
                    }
                }
            }

            far.signals_passing = near.signals_passing.clone();
            near.refresh_end_signals();
            far.refresh_end_signals();
            near.reset_active_pins();
            far.reset_active_pins();
        }
        self.sections.push(far);

        for at in repoint {
            self.set_pin(at, Pin { link: new_idx, direction: Direction::Ahead });
        }

        debug!("Split section {} at {} into {} and {}.", idx, pos, idx, new_idx);
        Ok(new_idx)
    }

    /// Inserts a zero-length seam node into the link leaving through `at`.
    pub fn insert_boundary_node(&mut self, at: PinRef) -> Result<SectionId, NetworkError> {
        let (pin, back) = self.resolve_link(at)?;
        let node_idx = self.sections.len();
        let mut node = Section::new(node_idx, CircuitType::Junction, 0.0);
        node.pins[Direction::Ahead.index()][Location::Near.index()] = Some(pin);
        node.pins[Direction::Reverse.index()][Location::Near.index()] =
            Some(Pin { link: at.section, direction: at.direction.reverse() });
        self.sections.push(node);

        self.set_pin(at, Pin { link: node_idx, direction: Direction::Ahead });
        self.set_pin(back, Pin { link: node_idx, direction: Direction::Reverse });
        debug!("Inserted boundary node {} after section {}.", node_idx, at.section);
        Ok(node_idx)
    }

    /// Replaces two crossing links by a single zero-length crossover section.
    /// The first link passes through the `Near` slots, the second through `Far`.
    pub fn add_crossover_junction(&mut self, first: PinRef, second: PinRef,
                                  shape: Option<&CrossoverShape>) -> Result<SectionId, NetworkError> {
        let (pin_a, back_a) = self.resolve_link(first)?;
        let (pin_b, back_b) = self.resolve_link(second)?;
        let idx = self.sections.len();
        let mut x = Section::new(idx, CircuitType::Crossover, 0.0);
        x.overlap = shape.and_then(|s| s.overlap).unwrap_or(0.0);
        for &(from, pin, l) in &[(first, pin_a, Location::Near), (second, pin_b, Location::Far)] {
            x.pins[Direction::Ahead.index()][l.index()] = Some(pin);
            x.pins[Direction::Reverse.index()][l.index()] =
                Some(Pin { link: from.section, direction: from.direction.reverse() });
        }
        self.sections.push(x);

        for &(from, back) in &[(first, back_a), (second, back_b)] {
            self.set_pin(from, Pin { link: idx, direction: Direction::Ahead });
            self.set_pin(back, Pin { link: idx, direction: Direction::Reverse });
        }
        debug!("Inserted crossover {} (overlap {}).", idx, self.section(idx).overlap);
        Ok(idx)
    }

    fn resolve_link(&self, at: PinRef) -> Result<(Pin, PinRef), NetworkError> {
        let s = self.sections.get(at.section).ok_or(NetworkError::UnknownSection(at.section))?;
        let pin = s.pin(at.direction, at.location)
            .ok_or(NetworkError::NoPin(at.section, at.direction, at.location))?;
        let back = self.reciprocal_location(at)
            .ok_or(NetworkError::NotReciprocal(at.section, at.direction, at.location))?;
        Ok((pin, PinRef { section: pin.link, direction: pin.direction.reverse(), location: back }))
    }

    /// Pin slots without a matching reciprocal, and active pins which are not
    /// pins at all.
    pub fn check_pins(&self) -> Vec<PinRef> {
        let mut bad = Vec::new();
        for s in &self.sections {
            for d in Direction::both().iter().cloned() {
                for l in Location::both().iter().cloned() {
                    let at = PinRef { section: s.index, direction: d, location: l };
                    if let Some(p) = s.pin(d, l) {
                        let ok = match self.sections.get(p.link) {
                            None => false,
                            Some(t) if t.kind == CircuitType::EndOfTrack => true,
                            Some(_) => self.reciprocal_location(at).is_some(),
                        };
                        if !ok { bad.push(at); continue; }
                    }
                    if let Some(a) = s.active_pin(d, l) {
                        if s.pin(d, l) != Some(a) { bad.push(at); }
                    }
                }
            }
        }
        bad
    }

    /// Re-binds agent identities restored from a snapshot. Records whose
    /// agent cannot be bound are dropped; their ids are returned.
    pub fn rebind_agents<F: Fn(AgentId) -> Option<AgentId>>(&mut self, bind: F) -> Vec<AgentId> {
        let mut unbound = Vec::new();
        {
            let mut map = |a: AgentId| -> Option<AgentId> {
                let r = bind(a);
                if r.is_none() { unbound.push(a); }
                r
            };
            for s in self.sections.iter_mut() {
                let st = &mut s.state;
                st.occupation = ::std::mem::replace(&mut st.occupation, Default::default())
                    .into_iter().filter_map(|(a, d)| map(a).map(|a| (a, d))).collect();
                st.reserved = st.reserved.and_then(|a| map(a));
                st.pre_reserved = st.pre_reserved.drain(..).filter_map(|a| map(a)).collect();
                st.claimed = st.claimed.drain(..).filter_map(|a| map(a)).collect();

                let dl = &mut s.deadlock;
                dl.traps = ::std::mem::replace(&mut dl.traps, Default::default())
                    .into_iter()
                    .filter_map(|(k, v)| {
                        let v: Vec<AgentId> = v.into_iter().filter_map(|a| map(a)).collect();
                        let k = map(k)?;
                        if v.is_empty() { None } else { Some((k, v)) }
                    })
                    .collect();
                dl.actives = dl.actives.drain(..).filter_map(|a| map(a)).collect();
                dl.awaited = dl.awaited.drain(..).filter_map(|a| map(a)).collect();

                s.alignments = ::std::mem::replace(&mut s.alignments, Default::default())
                    .into_iter().filter_map(|(a, p)| map(a).map(|a| (a, p))).collect();
                if s.is_junction_like() {
                    s.merge_alignments();
                }
            }
        }
        unbound.sort();
        unbound.dedup();
        unbound
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub fn pin(section: SectionId, direction: Direction, location: Location) -> PinRef {
        PinRef { section, direction, location }
    }

    pub fn ahead(section: SectionId) -> PinRef {
        pin(section, Direction::Ahead, Location::Near)
    }

    pub fn spec(kind: CircuitType, length: Dist) -> SectionSpec {
        SectionSpec { kind, length, overlap: 0.0, switch: None }
    }

    /// A straight line of plain sections, linked near-to-far.
    pub fn line(lengths: &[Dist]) -> TrackLayout {
        let mut layout = TrackLayout::default();
        for l in lengths {
            layout.sections.push(spec(CircuitType::Normal, *l));
        }
        for i in 1..lengths.len() {
            layout.links.push(Link { from: ahead(i - 1), to: ahead(i) });
        }
        layout
    }

    #[test]
    fn line_pins_are_reciprocal() {
        let net = Network::new(&line(&[100.0, 50.0, 25.0])).unwrap();
        assert!(net.check_pins().is_empty());
        assert_eq!(net.section(0).pin(Direction::Ahead, Location::Near),
                   Some(Pin { link: 1, direction: Direction::Ahead }));
        assert_eq!(net.section(1).pin(Direction::Reverse, Location::Near),
                   Some(Pin { link: 0, direction: Direction::Reverse }));
        assert_eq!(net.section(1).active_pins, net.section(1).pins);
    }

    #[test]
    fn split_redistributes_length_and_items() {
        let mut layout = line(&[100.0, 200.0, 100.0]);
        layout.items.push(ItemSpec { section: 1, item: TrackItem {
            kind: ItemKind::Signal(0), direction: Some(Direction::Ahead), offset: 190.0 } });
        layout.items.push(ItemSpec { section: 1, item: TrackItem {
            kind: ItemKind::Signal(1), direction: Some(Direction::Reverse), offset: 5.0 } });
        layout.items.push(ItemSpec { section: 1, item: TrackItem {
            kind: ItemKind::MilePost(0), direction: None, offset: 120.0 } });
        layout.annotations.push((1, Annotation { kind: AnnotationKind::Platform(4), start: 130.0, end: 180.0 }));
        let mut net = Network::new(&layout).unwrap();

        let new_idx = net.split(1, 80.0).unwrap();
        assert_eq!(new_idx, 3);
        assert!((net.length(1) + net.length(3) - 200.0).abs() < 0.01);
        assert!(net.check_pins().is_empty());

        assert_eq!(net.section(1).end_signal(Direction::Reverse), Some(1));
        assert_eq!(net.section(1).end_signal(Direction::Ahead), None);
        assert_eq!(net.section(3).end_signal(Direction::Ahead), Some(0));

        let total_items = net.section(1).items.len() + net.section(3).items.len();
        assert_eq!(total_items, 3);
        for s in &[1, 3] {
            for item in &net.section(*s).items {
                assert!(item.offset >= 0.0 && item.offset <= net.length(*s));
            }
        }
        let mile = net.section(3).items.iter().find(|i| i.kind == ItemKind::MilePost(0)).unwrap();
        assert!((mile.offset - 40.0).abs() < 1e-9);
        assert_eq!(net.section(3).annotations[0].start, 50.0);

        assert_eq!(net.section(2).pin(Direction::Reverse, Location::Near),
                   Some(Pin { link: 3, direction: Direction::Reverse }));
    }

    #[test]
    fn split_is_clamped() {
        let mut net = Network::new(&line(&[10.0])).unwrap();
        let n = net.split(0, 0.0).unwrap();
        assert!((net.length(0) - MIN_SECTION_LENGTH).abs() < 1e-9);
        assert!((net.length(0) + net.length(n) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn split_rejects_junctions() {
        let mut layout = line(&[10.0]);
        layout.sections.push(spec(CircuitType::Junction, 0.0));
        let mut net = Network::new(&layout).unwrap();
        match net.split(1, 0.0) {
            Err(NetworkError::NotSplittable(1, CircuitType::Junction)) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn boundary_node_is_wired_both_ways() {
        let mut net = Network::new(&line(&[10.0, 10.0])).unwrap();
        let n = net.insert_boundary_node(ahead(0)).unwrap();
        assert_eq!(net.length(n), 0.0);
        assert_eq!(net.section(n).kind, CircuitType::Junction);
        assert_eq!(net.section(0).pin(Direction::Ahead, Location::Near).map(|p| p.link), Some(n));
        assert_eq!(net.section(1).pin(Direction::Reverse, Location::Near).map(|p| p.link), Some(n));
        assert!(net.check_pins().is_empty());
    }

    #[test]
    fn crossover_copies_shape_overlap() {
        let mut layout = line(&[10.0, 10.0, 10.0, 10.0]);
        // two parallel links 0->1 and 2->3
        layout.links.retain(|l| l.from.section != 1);
        layout.shapes.push(CrossoverShape { overlap: Some(12.5) });
        layout.crossovers.push(CrossoverSpec { first: ahead(0), second: ahead(2), shape: Some(0) });
        let net = Network::new(&layout).unwrap();
        let x = net.section(4);
        assert_eq!(x.kind, CircuitType::Crossover);
        assert_eq!(x.overlap, 12.5);
        assert_eq!(x.pin(Direction::Ahead, Location::Far).map(|p| p.link), Some(3));
        assert_eq!(x.exit_location(Direction::Ahead, Some(2), None), Location::Far);
        assert!(net.check_pins().is_empty());

        let mut net2 = Network::new(&line(&[10.0, 10.0, 10.0, 10.0])).unwrap();
        let idx = net2.add_crossover_junction(ahead(0), ahead(2), None).unwrap();
        assert_eq!(net2.section(idx).overlap, 0.0);
    }

    #[test]
    fn alignments_of_agents_are_kept_apart() {
        let mut layout = line(&[10.0; 4]);
        layout.links.retain(|l| l.from.section != 1);
        layout.crossovers.push(CrossoverSpec { first: ahead(0), second: ahead(2), shape: None });
        let mut net = Network::new(&layout).unwrap();
        {
            let x = net.section_mut(4);
            assert!(x.align(1, Some(0), Some(1)));
            assert!(x.align(2, Some(2), Some(3)));
            assert!(!x.align(2, Some(2), Some(3)));
            assert_eq!(x.active_pin(Direction::Reverse, Location::Near).map(|p| p.link), Some(0));
            assert_eq!(x.active_pin(Direction::Reverse, Location::Far).map(|p| p.link), Some(2));

            assert!(x.release_alignment(1));
            assert!(!x.release_alignment(1));
            assert!(x.active_pin(Direction::Reverse, Location::Near).is_none());
            assert!(x.active_pin(Direction::Ahead, Location::Near).is_none());
            assert_eq!(x.active_pin(Direction::Ahead, Location::Far).map(|p| p.link), Some(3));
        }
        assert!(net.check_pins().is_empty());
    }

    #[test]
    fn rebind_reports_setters_of_dropped_traps() {
        let mut net = Network::new(&line(&[10.0, 10.0])).unwrap();
        net.section_mut(0).deadlock.traps.insert(5, vec![3, 4]);
        let unbound = net.rebind_agents(|a| if a == 4 { Some(40) } else { None });
        assert_eq!(unbound, vec![3, 5]);
        assert!(net.section(0).deadlock.traps.is_empty());
    }
}
