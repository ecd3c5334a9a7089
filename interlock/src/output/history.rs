use crate::input::layout::LayoutNames;
use crate::railway::{AgentId, Location, SectionId, SignalId};
use failure;

/// Receives every state change made by the interlocking.
pub type InfLogger = Box<dyn Fn(InterlockingLogEvent)>;

#[derive(Debug, Default)]
pub struct History {
    pub events: Vec<InterlockingLogEvent>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum InterlockingLogEvent {
    Reserved(SectionId, AgentId, bool),
    Occupied(SectionId, AgentId, bool),
    Claimed(SectionId, AgentId, bool),
    PreReserved(SectionId, AgentId, bool),
    SignalReserved(SectionId, SignalId, bool),
    /// Section, and the exit it now leads to on its facing side (None when de-aligned).
    Aligned(SectionId, Option<Location>),
    Switch(usize, Location),
    /// Anchor section, agent setting the trap, agent trapped.
    Trap(SectionId, AgentId, AgentId, bool),
    Awaiting(SectionId, AgentId),
    /// Section, agent losing its reservation, agent taking precedence.
    Displaced(SectionId, AgentId, AgentId),
}

impl History {
    pub fn reservations_of(&self, agent: AgentId) -> Vec<SectionId> {
        self.events.iter().filter_map(|e| match *e {
            InterlockingLogEvent::Reserved(s, a, true) if a == agent => Some(s),
            _ => None,
        }).collect()
    }
}

/// One event per line, with section names resolved where known.
pub fn describe(names: &LayoutNames<String>, h: &History) -> Result<String, failure::Error> {
    use std::fmt::Write;
    let name = |s: SectionId| names.section_name(s).map(|n| n.to_string()).unwrap_or_else(|| format!("#{}", s));
    let onoff = |b: bool| if b { "set" } else { "released" };
    let mut out = String::new();
    for ev in &h.events {
        use self::InterlockingLogEvent::*;
        match *ev {
            Reserved(s, a, b) => writeln!(out, "reserve {} agent {} {}", name(s), a, onoff(b))?,
            Occupied(s, a, b) => writeln!(out, "occupy {} agent {} {}", name(s), a, onoff(b))?,
            Claimed(s, a, b) => writeln!(out, "claim {} agent {} {}", name(s), a, onoff(b))?,
            PreReserved(s, a, b) => writeln!(out, "prereserve {} agent {} {}", name(s), a, onoff(b))?,
            SignalReserved(s, sig, b) => writeln!(out, "signal {} on {} {}", sig, name(s), onoff(b))?,
            Aligned(s, l) => writeln!(out, "align {} {:?}", name(s), l)?,
            Switch(sw, l) => writeln!(out, "throw {} {:?}", sw, l)?,
            Trap(s, a, b, set) => writeln!(out, "trap {} agent {} against {} {}", name(s), a, b, onoff(set))?,
            Awaiting(s, a) => writeln!(out, "await {} agent {}", name(s), a)?,
            Displaced(s, a, b) => writeln!(out, "displace {} agent {} by {}", name(s), a, b)?,
        }
    }
    Ok(out)
}
