// Snapshot format (little-endian throughout):
//   [0..4]  magic "ILCK"
//   [4..8]  format version (u32)
//   sections: u32 count, then one record per section in index order
//   paths:    u32 count, then one route path record each
//
// Sequences are u32 count-prefixed. Absent indices are written as i32 -1.
// Cross-references are section indices, never positions in the file.

use crate::input::layout::{AnnotationKind, CircuitType, ItemKind};
use crate::railway::builder::RoutePath;
use crate::railway::network::{Network, Pin, Section};
use crate::railway::route::{AlternativePathRef, ReversalInfo, Route, RouteElement, BoundaryKind};
use crate::railway::{Direction, Location};
use rayon::prelude::*;

pub const MAGIC: [u8; 4] = *b"ILCK";
pub const FORMAT_VERSION: u32 = 1;

/// Size of one encoded route element.
pub const ELEMENT_RECORD_SIZE: usize = 28;

#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Writer {
        Default::default()
    }

    pub fn u8(&mut self, x: u8) {
        self.buf.push(x);
    }

    pub fn bool(&mut self, x: bool) {
        self.buf.push(x as u8);
    }

    pub fn u32(&mut self, x: u32) {
        self.buf.extend_from_slice(&x.to_le_bytes());
    }

    pub fn i32(&mut self, x: i32) {
        self.buf.extend_from_slice(&x.to_le_bytes());
    }

    pub fn f64(&mut self, x: f64) {
        self.buf.extend_from_slice(&x.to_le_bytes());
    }

    pub fn count(&mut self, n: usize) {
        self.u32(n as u32);
    }

    pub fn index(&mut self, x: usize) {
        self.u32(x as u32);
    }

    pub fn opt(&mut self, x: Option<usize>) {
        self.i32(opt_index(x));
    }

    pub fn indices<'a, I: ExactSizeIterator<Item = &'a usize>>(&mut self, xs: I) {
        self.count(xs.len());
        for x in xs {
            self.index(*x);
        }
    }

    pub fn string(&mut self, s: &str) {
        self.count(s.len());
        self.buf.extend_from_slice(s.as_bytes());
    }

    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn opt_index(x: Option<usize>) -> i32 {
    x.map(|v| v as i32).unwrap_or(-1)
}

pub fn circuit_tag(k: CircuitType) -> u8 {
    match k {
        CircuitType::Normal => 0,
        CircuitType::Junction => 1,
        CircuitType::Crossover => 2,
        CircuitType::EndOfTrack => 3,
        CircuitType::Empty => 4,
    }
}

fn pin(w: &mut Writer, p: Option<Pin>) {
    w.opt(p.map(|p| p.link));
    w.u8(p.map(|p| p.direction.index() as u8).unwrap_or(0));
}

fn pins(w: &mut Writer, ps: &[[Option<Pin>; 2]; 2]) {
    for d in Direction::both().iter() {
        for l in Location::both().iter() {
            pin(w, ps[d.index()][l.index()]);
        }
    }
}

fn section(w: &mut Writer, s: &Section) {
    w.u8(circuit_tag(s.kind));
    w.f64(s.length);
    w.f64(s.overlap);
    w.opt(s.switch);
    pins(w, &s.pins);
    pins(w, &s.active_pins);
    w.count(s.alignments.len());
    for (agent, ps) in &s.alignments {
        w.index(*agent);
        pins(w, ps);
    }
    w.opt(s.end_signals[0]);
    w.opt(s.end_signals[1]);

    w.count(s.items.len());
    for item in &s.items {
        let (tag, id) = match item.kind {
            ItemKind::Signal(x) => (0, x),
            ItemKind::SpeedPost(x) => (1, x),
            ItemKind::MilePost(x) => (2, x),
        };
        w.u8(tag);
        w.index(id);
        w.opt(item.direction.map(|d| d.index()));
        w.f64(item.offset);
    }
    w.count(s.annotations.len());
    for a in &s.annotations {
        let (tag, id) = match a.kind {
            AnnotationKind::Platform(n) => (0, n),
            AnnotationKind::Tunnel => (1, 0),
            AnnotationKind::Trough => (2, 0),
        };
        w.u8(tag);
        w.index(id);
        w.f64(a.start);
        w.f64(a.end);
    }
    w.indices(s.signals_passing.iter());

    let st = &s.state;
    w.count(st.occupation.len());
    for (agent, d) in &st.occupation {
        w.index(*agent);
        w.u8(d.index() as u8);
    }
    w.opt(st.reserved);
    w.opt(st.signal_reserved);
    w.indices(st.pre_reserved.iter());
    w.indices(st.claimed.iter());
    w.bool(st.forced);

    let dl = &s.deadlock;
    w.count(dl.traps.len());
    for (trapped, setters) in &dl.traps {
        w.index(*trapped);
        w.indices(setters.iter());
    }
    w.indices(dl.actives.iter());
    w.indices(dl.awaited.iter());
}

fn alt_ref(out: &mut Vec<u8>, r: Option<AlternativePathRef>) {
    out.extend_from_slice(&opt_index(r.map(|r| r.path)).to_le_bytes());
    out.extend_from_slice(&opt_index(r.map(|r| r.section)).to_le_bytes());
}

/// Fixed-width record of one route element.
pub fn encode_element(e: &RouteElement) -> Vec<u8> {
    let mut out = Vec::with_capacity(ELEMENT_RECORD_SIZE);
    out.extend_from_slice(&(e.section as u32).to_le_bytes());
    out.push(e.direction.index() as u8);
    out.push((e.out_pin.0).index() as u8);
    out.push((e.out_pin.1).index() as u8);
    out.push(e.facing_point as u8);
    alt_ref(&mut out, e.start_alternative_path);
    alt_ref(&mut out, e.end_alternative_path);
    out.extend_from_slice(&opt_index(e.used_alternative_path).to_le_bytes());
    out
}

/// Elements are encoded independently in parallel and written in route order.
pub fn route(w: &mut Writer, r: &Route) {
    let records: Vec<Vec<u8>> = r.elements().par_iter().map(encode_element).collect();
    w.count(records.len());
    for rec in &records {
        w.bytes(rec);
    }
}

pub fn reversal(w: &mut Writer, r: &ReversalInfo) {
    w.u8(match r.kind {
        BoundaryKind::Reversal => 0,
        BoundaryKind::Loop => 1,
    });
    w.bool(r.valid);
    w.opt(r.last_divergence);
    w.opt(r.first_divergence);
    w.opt(r.divergence_section);
    w.f64(r.diverge_offset);
    w.bool(r.signal_available);
    w.bool(r.signal_used);
    w.opt(r.last_signal_index);
    w.opt(r.signal_section);
    w.opt(r.signal);
    w.f64(r.signal_offset);
    w.f64(r.reverse_reversal_offset);
    w.index(r.reversal_index);
    w.index(r.reversal_section);
}

pub fn route_path(w: &mut Writer, p: &RoutePath) {
    w.count(p.legs.len());
    for leg in &p.legs {
        route(w, leg);
    }
    w.count(p.reversals.len());
    for r in &p.reversals {
        reversal(w, r);
    }
    w.count(p.waiting_points.len());
    for wp in &p.waiting_points {
        w.index(wp.leg);
        w.index(wp.index);
        w.index(wp.section);
        w.f64(wp.offset.unwrap_or(-1.0));
        w.f64(wp.duration.unwrap_or(-1.0));
    }
    w.count(p.alternative_paths.len());
    for a in &p.alternative_paths {
        w.string(&a.name);
        w.index(a.leg);
        w.index(a.start_index);
        w.index(a.end_index);
        w.index(a.boundary);
        w.index(a.path_index);
        route(w, &a.route);
        w.f64(a.useful_length);
    }
}

/// The dynamic state of the network and the given route paths.
pub fn write_snapshot(net: &Network, paths: &[RoutePath]) -> Vec<u8> {
    let mut w = Writer::new();
    w.bytes(&MAGIC);
    w.u32(FORMAT_VERSION);
    w.count(net.len());
    for s in &net.sections {
        section(&mut w, s);
    }
    w.count(paths.len());
    for p in paths {
        route_path(&mut w, p);
    }
    w.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_record_is_fixed_width() {
        let mut e = RouteElement::plain(7, Direction::Reverse);
        assert_eq!(encode_element(&e).len(), ELEMENT_RECORD_SIZE);
        e.start_alternative_path = Some(AlternativePathRef { path: 1, section: 9 });
        e.used_alternative_path = Some(0);
        let rec = encode_element(&e);
        assert_eq!(rec.len(), ELEMENT_RECORD_SIZE);
        assert_eq!(&rec[0..4], &7u32.to_le_bytes());
        assert_eq!(rec[4], 1);
        assert_eq!(&rec[8..12], &1i32.to_le_bytes());
        assert_eq!(&rec[16..20], &(-1i32).to_le_bytes());
    }

    #[test]
    fn route_keeps_element_order() {
        let r: Route = (0..100).map(|s| RouteElement::plain(s, Direction::Ahead)).collect();
        let mut w = Writer::new();
        route(&mut w, &r);
        let b = w.into_bytes();
        assert_eq!(b.len(), 4 + 100 * ELEMENT_RECORD_SIZE);
        for i in 0..100 {
            let at = 4 + i * ELEMENT_RECORD_SIZE;
            assert_eq!(&b[at..at + 4], &(i as u32).to_le_bytes());
        }
    }
}
