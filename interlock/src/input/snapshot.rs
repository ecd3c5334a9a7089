use crate::input::layout::{Annotation, AnnotationKind, CircuitType, ItemKind, TrackItem};
use crate::output::snapshot::{ELEMENT_RECORD_SIZE, FORMAT_VERSION, MAGIC};
use crate::railway::builder::{AlternativePath, RoutePath, WaitingPoint};
use crate::railway::network::{Network, Pin, Pins, Section};
use crate::railway::route::{AlternativePathRef, BoundaryKind, ReversalInfo, Route, RouteElement};
use crate::railway::{AgentId, Direction, Location, SectionId};
use log::{debug, warn};
use rayon::prelude::*;

#[derive(Debug, Fail)]
pub enum SnapshotError {
    #[fail(display = "not a snapshot file")]
    BadMagic,
    #[fail(display = "unsupported snapshot version {}", _0)]
    Version(u32),
    #[fail(display = "snapshot truncated at byte {}", _0)]
    Truncated(usize),
    #[fail(display = "invalid {} tag {} at byte {}", _0, _1, _2)]
    BadTag(&'static str, u8, usize),
    #[fail(display = "invalid index {} at byte {}", _0, _1)]
    BadIndex(i32, usize),
    #[fail(display = "reference to section {} but only {} sections were restored", _0, _1)]
    BadReference(SectionId, usize),
    #[fail(display = "invalid string at byte {}", _0)]
    Utf8(usize),
}

pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Reader<'a> {
        Reader { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8], SnapshotError> {
        let end = self.pos.checked_add(n).ok_or(SnapshotError::Truncated(self.pos))?;
        if end > self.data.len() {
            return Err(SnapshotError::Truncated(self.pos));
        }
        let b = &self.data[self.pos..end];
        self.pos = end;
        Ok(b)
    }

    fn array4(&mut self) -> Result<[u8; 4], SnapshotError> {
        let b = self.bytes(4)?;
        let mut a = [0u8; 4];
        a.copy_from_slice(b);
        Ok(a)
    }

    pub fn u8(&mut self) -> Result<u8, SnapshotError> {
        Ok(self.bytes(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, SnapshotError> {
        let at = self.pos;
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            x => Err(SnapshotError::BadTag("bool", x, at)),
        }
    }

    pub fn u32(&mut self) -> Result<u32, SnapshotError> {
        Ok(u32::from_le_bytes(self.array4()?))
    }

    pub fn i32(&mut self) -> Result<i32, SnapshotError> {
        Ok(i32::from_le_bytes(self.array4()?))
    }

    pub fn f64(&mut self) -> Result<f64, SnapshotError> {
        let b = self.bytes(8)?;
        let mut a = [0u8; 8];
        a.copy_from_slice(b);
        Ok(f64::from_le_bytes(a))
    }

    /// A count prefix. Counts larger than the remaining input are rejected
    /// before anything is allocated for them.
    pub fn count(&mut self) -> Result<usize, SnapshotError> {
        let at = self.pos;
        let n = self.u32()? as usize;
        if n > self.data.len() - self.pos {
            return Err(SnapshotError::Truncated(at));
        }
        Ok(n)
    }

    pub fn index(&mut self) -> Result<usize, SnapshotError> {
        Ok(self.u32()? as usize)
    }

    pub fn opt(&mut self) -> Result<Option<usize>, SnapshotError> {
        let at = self.pos;
        decode_opt(self.i32()?, at)
    }

    pub fn indices<C: ::std::iter::FromIterator<usize>>(&mut self) -> Result<C, SnapshotError> {
        let n = self.count()?;
        (0..n).map(|_| self.index()).collect()
    }

    pub fn string(&mut self) -> Result<String, SnapshotError> {
        let n = self.count()?;
        let at = self.pos;
        let b = self.bytes(n)?;
        String::from_utf8(b.to_vec()).map_err(|_| SnapshotError::Utf8(at))
    }

    pub fn direction(&mut self) -> Result<Direction, SnapshotError> {
        let at = self.pos;
        let x = self.u8()?;
        Direction::from_index(x as usize).ok_or(SnapshotError::BadTag("direction", x, at))
    }

    pub fn is_done(&self) -> bool {
        self.pos == self.data.len()
    }
}

fn decode_opt(x: i32, at: usize) -> Result<Option<usize>, SnapshotError> {
    match x {
        -1 => Ok(None),
        x if x >= 0 => Ok(Some(x as usize)),
        x => Err(SnapshotError::BadIndex(x, at)),
    }
}

pub fn circuit_type(x: u8, at: usize) -> Result<CircuitType, SnapshotError> {
    match x {
        0 => Ok(CircuitType::Normal),
        1 => Ok(CircuitType::Junction),
        2 => Ok(CircuitType::Crossover),
        3 => Ok(CircuitType::EndOfTrack),
        4 => Ok(CircuitType::Empty),
        x => Err(SnapshotError::BadTag("circuit", x, at)),
    }
}

fn pins(r: &mut Reader) -> Result<Pins, SnapshotError> {
    let mut p: Pins = [[None; 2]; 2];
    for d in Direction::both().iter() {
        for l in Location::both().iter() {
            let link = r.opt()?;
            let direction = r.direction()?;
            p[d.index()][l.index()] = link.map(|link| Pin { link, direction });
        }
    }
    Ok(p)
}

fn section(r: &mut Reader, index: SectionId) -> Result<Section, SnapshotError> {
    let at = r.position();
    let kind = circuit_type(r.u8()?, at)?;
    let mut s = Section::new(index, kind, r.f64()?);
    s.overlap = r.f64()?;
    s.switch = r.opt()?;
    s.pins = pins(r)?;
    s.active_pins = pins(r)?;
    let n = r.count()?;
    for _ in 0..n {
        let agent = r.index()?;
        let ps = pins(r)?;
        s.alignments.insert(agent, ps);
    }
    s.end_signals = [r.opt()?, r.opt()?];

    let n = r.count()?;
    for _ in 0..n {
        let at = r.position();
        let tag = r.u8()?;
        let id = r.index()?;
        let kind = match tag {
            0 => ItemKind::Signal(id),
            1 => ItemKind::SpeedPost(id),
            2 => ItemKind::MilePost(id),
            x => return Err(SnapshotError::BadTag("item", x, at)),
        };
        let at = r.position();
        let direction = match r.opt()? {
            Some(d) => Some(Direction::from_index(d).ok_or(SnapshotError::BadTag("direction", d as u8, at))?),
            None => None,
        };
        s.items.push(TrackItem { kind, direction, offset: r.f64()? });
    }
    let n = r.count()?;
    for _ in 0..n {
        let at = r.position();
        let tag = r.u8()?;
        let id = r.index()?;
        let kind = match tag {
            0 => AnnotationKind::Platform(id),
            1 => AnnotationKind::Tunnel,
            2 => AnnotationKind::Trough,
            x => return Err(SnapshotError::BadTag("annotation", x, at)),
        };
        s.annotations.push(Annotation { kind, start: r.f64()?, end: r.f64()? });
    }
    s.signals_passing = r.indices()?;

    let n = r.count()?;
    for _ in 0..n {
        let agent = r.index()?;
        let d = r.direction()?;
        s.state.occupation.insert(agent, d);
    }
    s.state.reserved = r.opt()?;
    s.state.signal_reserved = r.opt()?;
    s.state.pre_reserved = r.indices()?;
    s.state.claimed = r.indices()?;
    s.state.forced = r.bool()?;

    let n = r.count()?;
    for _ in 0..n {
        let trapped = r.index()?;
        let setters = r.indices()?;
        s.deadlock.traps.insert(trapped, setters);
    }
    s.deadlock.actives = r.indices()?;
    s.deadlock.awaited = r.indices()?;
    Ok(s)
}

fn alt_ref(b: &[u8], at: usize) -> Result<Option<AlternativePathRef>, SnapshotError> {
    let path = decode_opt(i32_at(b, 0), at)?;
    let section = decode_opt(i32_at(b, 4), at)?;
    Ok(match (path, section) {
        (Some(path), Some(section)) => Some(AlternativePathRef { path, section }),
        _ => None,
    })
}

fn i32_at(b: &[u8], i: usize) -> i32 {
    let mut a = [0u8; 4];
    a.copy_from_slice(&b[i..i + 4]);
    i32::from_le_bytes(a)
}

/// Decodes one fixed-width element record. `at` is only used for errors.
pub fn decode_element(b: &[u8], at: usize) -> Result<RouteElement, SnapshotError> {
    let tag = |i: usize, what: &'static str| SnapshotError::BadTag(what, b[i], at + i);
    let section = i32_at(b, 0) as u32 as usize;
    let direction = Direction::from_index(b[4] as usize).ok_or_else(|| tag(4, "direction"))?;
    let out_dir = Direction::from_index(b[5] as usize).ok_or_else(|| tag(5, "direction"))?;
    let out_loc = Location::from_index(b[6] as usize).ok_or_else(|| tag(6, "location"))?;
    let facing_point = match b[7] {
        0 => false,
        1 => true,
        _ => return Err(tag(7, "bool")),
    };
    Ok(RouteElement {
        section,
        direction,
        out_pin: (out_dir, out_loc),
        facing_point,
        start_alternative_path: alt_ref(&b[8..16], at + 8)?,
        end_alternative_path: alt_ref(&b[16..24], at + 16)?,
        used_alternative_path: decode_opt(i32_at(b, 24), at + 24)?,
    })
}

/// Element records are decoded in parallel. The collected route keeps the
/// order of the records.
pub fn route(r: &mut Reader) -> Result<Route, SnapshotError> {
    let n = r.count()?;
    let start = r.position();
    let len = n.checked_mul(ELEMENT_RECORD_SIZE).ok_or(SnapshotError::Truncated(start))?;
    let data = r.bytes(len)?;
    let elements = data.par_chunks(ELEMENT_RECORD_SIZE)
        .enumerate()
        .map(|(i, b)| decode_element(b, start + i * ELEMENT_RECORD_SIZE))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Route::from_elements(elements))
}

pub fn reversal(r: &mut Reader) -> Result<ReversalInfo, SnapshotError> {
    let at = r.position();
    let kind = match r.u8()? {
        0 => BoundaryKind::Reversal,
        1 => BoundaryKind::Loop,
        x => return Err(SnapshotError::BadTag("boundary", x, at)),
    };
    Ok(ReversalInfo {
        kind,
        valid: r.bool()?,
        last_divergence: r.opt()?,
        first_divergence: r.opt()?,
        divergence_section: r.opt()?,
        diverge_offset: r.f64()?,
        signal_available: r.bool()?,
        signal_used: r.bool()?,
        last_signal_index: r.opt()?,
        signal_section: r.opt()?,
        signal: r.opt()?,
        signal_offset: r.f64()?,
        reverse_reversal_offset: r.f64()?,
        reversal_index: r.index()?,
        reversal_section: r.index()?,
    })
}

fn non_negative(x: f64) -> Option<f64> {
    if x < 0.0 { None } else { Some(x) }
}

pub fn route_path(r: &mut Reader) -> Result<RoutePath, SnapshotError> {
    let mut p = RoutePath::default();
    let n = r.count()?;
    for _ in 0..n {
        p.legs.push(route(r)?);
    }
    let n = r.count()?;
    for _ in 0..n {
        p.reversals.push(reversal(r)?);
    }
    let n = r.count()?;
    for _ in 0..n {
        p.waiting_points.push(WaitingPoint {
            leg: r.index()?,
            index: r.index()?,
            section: r.index()?,
            offset: non_negative(r.f64()?),
            duration: non_negative(r.f64()?),
        });
    }
    let n = r.count()?;
    for _ in 0..n {
        p.alternative_paths.push(AlternativePath {
            name: r.string()?,
            leg: r.index()?,
            start_index: r.index()?,
            end_index: r.index()?,
            boundary: r.index()?,
            path_index: r.index()?,
            route: route(r)?,
            useful_length: r.f64()?,
        });
    }
    Ok(p)
}

#[derive(Debug)]
pub struct Snapshot {
    pub network: Network,
    pub paths: Vec<RoutePath>,
}

fn check_route(route: &Route, n: usize) -> Result<(), SnapshotError> {
    for e in route {
        let refs = e.start_alternative_path.iter().chain(e.end_alternative_path.iter()).map(|a| a.section);
        for s in Some(e.section).into_iter().chain(refs) {
            if s >= n {
                return Err(SnapshotError::BadReference(s, n));
            }
        }
    }
    Ok(())
}

/// Every section reference must point into the restored section list.
fn check_references(snap: &Snapshot) -> Result<(), SnapshotError> {
    let n = snap.network.len();
    let bad = |s: SectionId| if s >= n { Err(SnapshotError::BadReference(s, n)) } else { Ok(()) };
    for s in &snap.network.sections {
        for ps in [&s.pins, &s.active_pins].iter().cloned().chain(s.alignments.values()) {
            for p in ps.iter().flat_map(|x| x.iter()).filter_map(|p| *p) {
                bad(p.link)?;
            }
        }
    }
    for p in &snap.paths {
        for leg in &p.legs {
            check_route(leg, n)?;
        }
        for rev in &p.reversals {
            bad(rev.reversal_section)?;
            if let Some(s) = rev.divergence_section { bad(s)?; }
            if let Some(s) = rev.signal_section { bad(s)?; }
        }
        for w in &p.waiting_points {
            bad(w.section)?;
        }
        for a in &p.alternative_paths {
            check_route(&a.route, n)?;
        }
    }
    Ok(())
}

/// Reads a snapshot. All sections are restored before any reference between
/// them is checked. Agent ids in the section states are left as written;
/// see `restore` for binding them to live agents.
pub fn read_snapshot(data: &[u8]) -> Result<Snapshot, SnapshotError> {
    let mut r = Reader::new(data);
    if r.bytes(MAGIC.len()).map_err(|_| SnapshotError::BadMagic)? != &MAGIC[..] {
        return Err(SnapshotError::BadMagic);
    }
    let version = r.u32()?;
    if version != FORMAT_VERSION {
        return Err(SnapshotError::Version(version));
    }

    let n = r.count()?;
    let mut sections = Vec::with_capacity(n);
    for i in 0..n {
        sections.push(section(&mut r, i)?);
    }
    let n = r.count()?;
    let mut paths = Vec::with_capacity(n);
    for _ in 0..n {
        paths.push(route_path(&mut r)?);
    }
    if !r.is_done() {
        warn!("Snapshot has {} trailing bytes", data.len() - r.position());
    }

    let snap = Snapshot { network: Network { sections }, paths };
    check_references(&snap)?;
    debug!("Restored {} sections and {} route paths", snap.network.len(), snap.paths.len());
    Ok(snap)
}

/// Reads a snapshot and binds every agent id in it through `bind`. Returns
/// the ids that could not be bound; their records are dropped.
pub fn restore<F>(data: &[u8], bind: F) -> Result<(Snapshot, Vec<AgentId>), SnapshotError>
    where F: Fn(AgentId) -> Option<AgentId>
{
    let mut snap = read_snapshot(data)?;
    let unbound = snap.network.rebind_agents(bind);
    for a in &unbound {
        warn!("Snapshot references unknown agent {}", a);
    }
    Ok((snap, unbound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::snapshot::{encode_element, write_snapshot};
    use crate::railway::network::tests::line;
    use crate::railway::route::ReversalInfo;

    fn state() -> (Network, RoutePath) {
        let mut net = Network::new(&line(&[100.0, 200.0, 300.0])).unwrap();
        {
            let s = net.section_mut(1);
            s.state.occupation.insert(4, Direction::Reverse);
            s.state.reserved = Some(4);
            s.state.claimed.push_back(9);
            s.state.claimed.push_back(2);
            s.state.forced = true;
            s.deadlock.set_trap(4, 9);
        }
        net.section_mut(2).state.pre_reserved.push_back(9);
        net.section_mut(0).signals_passing.push(3);
        let way = net.section(1).pins;
        net.section_mut(1).alignments.insert(9, way);
        net.section_mut(1).alignments.insert(4, way);

        let leg = Route::from_sections(&net, &[(0, Direction::Ahead), (1, Direction::Ahead), (2, Direction::Ahead)]);
        let mut back = leg.reverse_path(&net);
        back.element_mut(0).used_alternative_path = Some(0);
        let path = RoutePath {
            legs: vec![leg, back],
            reversals: vec![ReversalInfo::synthetic(2, 2)],
            waiting_points: vec![WaitingPoint { leg: 0, index: 1, section: 1, offset: Some(50.0), duration: None }],
            alternative_paths: vec![],
        };
        (net, path)
    }

    #[test]
    fn round_trip_restores_state_and_paths() {
        let (net, path) = state();
        let bytes = write_snapshot(&net, &[path.clone()]);
        let snap = read_snapshot(&bytes).unwrap();

        assert_eq!(snap.network.len(), 3);
        for (a, b) in net.sections.iter().zip(snap.network.sections.iter()) {
            assert_eq!(a.kind, b.kind);
            assert_eq!(a.length, b.length);
            assert_eq!(a.pins, b.pins);
            assert_eq!(a.state, b.state);
            assert_eq!(a.deadlock, b.deadlock);
            assert_eq!(a.signals_passing, b.signals_passing);
            assert_eq!(a.alignments, b.alignments);
        }
        assert_eq!(snap.paths, vec![path]);
    }

    #[test]
    fn restore_drops_unknown_agents() {
        let (net, path) = state();
        let bytes = write_snapshot(&net, &[path]);
        let (snap, unbound) = restore(&bytes, |a| if a == 9 { None } else { Some(a + 100) }).unwrap();
        assert_eq!(unbound, vec![9]);
        let s = snap.network.section(1);
        assert_eq!(s.state.reserved, Some(104));
        assert_eq!(s.state.claimed.iter().cloned().collect::<Vec<_>>(), vec![102]);
        assert!(s.deadlock.traps.is_empty());
        assert_eq!(s.alignments.keys().cloned().collect::<Vec<_>>(), vec![104]);
        assert!(snap.network.section(2).state.pre_reserved.is_empty());
    }

    #[test]
    fn rejects_dangling_section_reference() {
        let (net, _) = state();
        let route = Route::from_elements(vec![RouteElement::plain(7, Direction::Ahead)]);
        let path = RoutePath { legs: vec![route], ..Default::default() };
        match read_snapshot(&write_snapshot(&net, &[path])) {
            Err(SnapshotError::BadReference(7, 3)) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn rejects_bad_header_and_truncation() {
        match read_snapshot(b"NOPE") {
            Err(SnapshotError::BadMagic) => {}
            x => panic!("unexpected {:?}", x),
        }
        let (net, path) = state();
        let bytes = write_snapshot(&net, &[path]);
        match read_snapshot(&bytes[..bytes.len() - 3]) {
            Err(SnapshotError::Truncated(_)) => {}
            x => panic!("unexpected {:?}", x),
        }
    }

    #[test]
    fn element_decodes_as_encoded() {
        let mut e = RouteElement::plain(12, Direction::Reverse);
        e.out_pin = (Direction::Reverse, Location::Far);
        e.facing_point = true;
        e.end_alternative_path = Some(AlternativePathRef { path: 3, section: 40 });
        assert_eq!(decode_element(&encode_element(&e), 0).unwrap(), e);

        let mut bad = encode_element(&e);
        bad[6] = 5;
        match decode_element(&bad, 0) {
            Err(SnapshotError::BadTag("location", 5, 6)) => {}
            x => panic!("unexpected {:?}", x),
        }
    }
}
