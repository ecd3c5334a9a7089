use failure::Error;
use super::history::{History, InterlockingLogEvent};
use crate::input::layout::LayoutNames;
use crate::railway::builder::RoutePath;
use crate::railway::route::{BoundaryKind, Route};
use crate::railway::{Direction, Location, SectionId};

use std::io;

fn name(names: &LayoutNames<String>, s: SectionId) -> String {
    match names.section_name(s) {
        Some(n) => n.to_string(),
        None => format!("#{}", s),
    }
}

fn dir(d: Direction) -> &'static str {
    match d {
        Direction::Ahead => "ahead",
        Direction::Reverse => "reverse",
    }
}

fn loc(l: Location) -> &'static str {
    match l {
        Location::Near => "near",
        Location::Far => "far",
    }
}

fn opt<T: ::std::fmt::Display>(x: Option<T>) -> String {
    match x {
        Some(x) => format!("{}", x),
        None => "null".to_string(),
    }
}

fn route<W: io::Write>(names: &LayoutNames<String>, r: &Route, f: &mut W) -> Result<(), Error> {
    write!(f, "[")?;
    let mut first = true;
    for e in r {
        if first { first = false; } else { write!(f, ", ")?; }
        write!(f, "{{ \"section\": \"{}\", \"direction\": \"{}\", \"exit\": \"{}\", \"facing\": {}",
               name(names, e.section), dir(e.direction), loc(e.exit()), e.facing_point)?;
        if let Some(a) = e.start_alternative_path {
            write!(f, ", \"alternative_start\": {{ \"path\": {}, \"to\": \"{}\" }}", a.path, name(names, a.section))?;
        }
        if let Some(a) = e.end_alternative_path {
            write!(f, ", \"alternative_end\": {{ \"path\": {}, \"from\": \"{}\" }}", a.path, name(names, a.section))?;
        }
        write!(f, " }}")?;
    }
    write!(f, "]")?;
    Ok(())
}

pub fn json_route_path<W: io::Write>(names: &LayoutNames<String>, p: &RoutePath, f: &mut W) -> Result<(), Error> {
    write!(f, "{{ \"legs\": [")?;
    let mut first = true;
    for leg in &p.legs {
        if first { first = false; } else { write!(f, ", ")?; }
        route(names, leg, f)?;
    }
    write!(f, "],\n\"boundaries\": [")?;
    let mut first = true;
    for r in &p.reversals {
        if first { first = false; } else { write!(f, ", ")?; }
        write!(f, "{{ \"kind\": \"{}\", \"section\": \"{}\", \"index\": {}, \"valid\": {}, \
                   \"divergence\": {}, \"diverge_offset\": {}, \"signal\": {} }}",
               match r.kind { BoundaryKind::Reversal => "reversal", BoundaryKind::Loop => "loop" },
               name(names, r.reversal_section), r.reversal_index, r.valid,
               match r.divergence_section { Some(s) => format!("\"{}\"", name(names, s)), None => "null".to_string() },
               r.diverge_offset, opt(r.signal))?;
    }
    write!(f, "],\n\"waiting_points\": [")?;
    let mut first = true;
    for w in &p.waiting_points {
        if first { first = false; } else { write!(f, ", ")?; }
        write!(f, "{{ \"leg\": {}, \"index\": {}, \"section\": \"{}\", \"offset\": {}, \"duration\": {} }}",
               w.leg, w.index, name(names, w.section), opt(w.offset), opt(w.duration))?;
    }
    write!(f, "],\n\"alternatives\": [")?;
    let mut first = true;
    for a in &p.alternative_paths {
        if first { first = false; } else { write!(f, ", ")?; }
        write!(f, "{{ \"name\": \"{}\", \"leg\": {}, \"start\": {}, \"end\": {}, \"useful_length\": {}, \"route\": ",
               a.name, a.leg, a.start_index, a.end_index, a.useful_length)?;
        route(names, &a.route, f)?;
        write!(f, " }}")?;
    }
    write!(f, "] }}\n")?;
    Ok(())
}

pub fn json_history<W: io::Write>(names: &LayoutNames<String>, h: &History, f: &mut W) -> Result<(), Error> {
    let w = |f: &mut W, e: &str, s: SectionId, r: String, v: String| -> Result<(), Error> {
        write!(f, "{{ \"event\": \"{}\", \"section\": \"{}\", \"ref\": {}, \"value\": {} }}",
               e, name(names, s), r, v)?;
        Ok(())
    };

    write!(f, "[")?;
    let mut first = true;
    for ev in &h.events {
        use self::InterlockingLogEvent::*;
        if first { first = false; } else { write!(f, ",\n ")?; }
        match *ev {
            Reserved(s, a, b) => w(f, "reserved", s, a.to_string(), b.to_string())?,
            Occupied(s, a, b) => w(f, "occupied", s, a.to_string(), b.to_string())?,
            Claimed(s, a, b) => w(f, "claimed", s, a.to_string(), b.to_string())?,
            PreReserved(s, a, b) => w(f, "prereserved", s, a.to_string(), b.to_string())?,
            SignalReserved(s, sig, b) => w(f, "signal", s, sig.to_string(), b.to_string())?,
            Aligned(s, l) => w(f, "aligned", s, "null".to_string(),
                               match l { Some(l) => format!("\"{}\"", loc(l)), None => "null".to_string() })?,
            Switch(sw, l) => write!(f, "{{ \"event\": \"switch\", \"ref\": {}, \"value\": \"{}\" }}", sw, loc(l))?,
            Trap(s, a, b, set) => w(f, "trap", s, format!("[{}, {}]", a, b), set.to_string())?,
            Awaiting(s, a) => w(f, "awaiting", s, a.to_string(), "true".to_string())?,
            Displaced(s, a, b) => w(f, "displaced", s, a.to_string(), b.to_string())?,
        }
    }
    write!(f, "]\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::route::RouteElement;

    #[test]
    fn route_path_uses_section_names() {
        let mut names = LayoutNames::default();
        names.section_names.insert("a".to_string(), 0);
        let leg = Route::from_elements(vec![RouteElement::plain(0, Direction::Ahead),
                                            RouteElement::plain(1, Direction::Ahead)]);
        let p = RoutePath { legs: vec![leg], ..Default::default() };
        let mut out = Vec::new();
        json_route_path(&names, &p, &mut out).unwrap();
        let s = String::from_utf8(out).unwrap();
        assert!(s.starts_with("{ \"legs\": [[{ \"section\": \"a\", \"direction\": \"ahead\", \"exit\": \"near\""));
        assert!(s.contains("\"section\": \"#1\""));
        assert!(s.contains("\"alternatives\": [] }"));
    }

    #[test]
    fn history_events_are_comma_separated() {
        let names = LayoutNames::default();
        let h = History { events: vec![InterlockingLogEvent::Reserved(2, 1, true),
                                       InterlockingLogEvent::Switch(4, Location::Far)] };
        let mut out = Vec::new();
        json_history(&names, &h, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(),
                   "[{ \"event\": \"reserved\", \"section\": \"#2\", \"ref\": 1, \"value\": true },\n \
                    { \"event\": \"switch\", \"ref\": 4, \"value\": \"far\" }]\n");
    }
}
