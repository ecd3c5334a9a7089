use super::*;
use super::network::Network;
use smallvec::SmallVec;

use std::cell::RefCell;
use std::collections::HashMap;
use std::iter::FromIterator;
use std::ops::Index;

/// Reference from a main route element to the other end of a passing path.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AlternativePathRef {
    pub path: usize,
    pub section: SectionId,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RouteElement {
    pub section: SectionId,
    pub direction: Direction,
    /// Exit used when leaving: `(direction, location)` into the section's pins.
    pub out_pin: (Direction, Location),
    pub facing_point: bool,
    pub start_alternative_path: Option<AlternativePathRef>,
    pub end_alternative_path: Option<AlternativePathRef>,
    pub used_alternative_path: Option<usize>,
}

impl RouteElement {
    /// Element for `section` traversed in `direction`, with the exit resolved
    /// from its neighbours on the route.
    pub fn new(net: &Network, section: SectionId, direction: Direction,
               prev: Option<SectionId>, next: Option<SectionId>) -> RouteElement {
        let s = net.section(section);
        let choice = next.and_then(|n| s.exit_towards(direction, n));
        let location = s.exit_location(direction, prev, choice);
        RouteElement {
            out_pin: (direction, location),
            facing_point: s.is_facing(direction),
            ..RouteElement::plain(section, direction)
        }
    }

    pub fn plain(section: SectionId, direction: Direction) -> RouteElement {
        RouteElement {
            section,
            direction,
            out_pin: (direction, Location::Near),
            facing_point: false,
            start_alternative_path: None,
            end_alternative_path: None,
            used_alternative_path: None,
        }
    }

    pub fn exit(&self) -> Location {
        self.out_pin.1
    }
}

/// One leg of a path: the sections to traverse between two reversals.
#[derive(Debug, Default)]
pub struct Route {
    elements: Vec<RouteElement>,
    // Built on first lookup, dropped on every structural change.
    index: RefCell<Option<HashMap<SectionId, SmallVec<[usize; 2]>>>>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct UsefulLength {
    pub length: Dist,
    pub last_index: Option<usize>,
}

impl Clone for Route {
    fn clone(&self) -> Route {
        Route::from_elements(self.elements.clone())
    }
}

impl PartialEq for Route {
    fn eq(&self, other: &Route) -> bool {
        self.elements == other.elements
    }
}

impl Index<usize> for Route {
    type Output = RouteElement;
    fn index(&self, i: usize) -> &RouteElement {
        &self.elements[i]
    }
}

impl FromIterator<RouteElement> for Route {
    fn from_iter<I: IntoIterator<Item = RouteElement>>(iter: I) -> Route {
        Route::from_elements(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Route {
    type Item = &'a RouteElement;
    type IntoIter = ::std::slice::Iter<'a, RouteElement>;
    fn into_iter(self) -> Self::IntoIter {
        self.elements.iter()
    }
}

impl Route {
    pub fn new() -> Route {
        Default::default()
    }

    pub fn from_elements(elements: Vec<RouteElement>) -> Route {
        Route { elements, index: RefCell::new(None) }
    }

    /// Builds elements for a section sequence, resolving each exit from its
    /// neighbours.
    pub fn from_sections(net: &Network, sections: &[(SectionId, Direction)]) -> Route {
        (0..sections.len()).map(|i| {
            let prev = if i > 0 { Some(sections[i - 1].0) } else { None };
            let next = sections.get(i + 1).map(|s| s.0);
            RouteElement::new(net, sections[i].0, sections[i].1, prev, next)
        }).collect()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[RouteElement] {
        &self.elements
    }

    pub fn iter(&self) -> ::std::slice::Iter<RouteElement> {
        self.elements.iter()
    }

    pub fn get(&self, i: usize) -> Option<&RouteElement> {
        self.elements.get(i)
    }

    pub fn first(&self) -> Option<&RouteElement> {
        self.elements.first()
    }

    pub fn last(&self) -> Option<&RouteElement> {
        self.elements.last()
    }

    pub fn sections(&self) -> Vec<SectionId> {
        self.elements.iter().map(|e| e.section).collect()
    }

    fn invalidate(&mut self) {
        *self.index.get_mut() = None;
    }

    pub fn element_mut(&mut self, i: usize) -> &mut RouteElement {
        self.invalidate();
        &mut self.elements[i]
    }

    pub fn push(&mut self, e: RouteElement) {
        self.invalidate();
        self.elements.push(e);
    }

    pub fn insert(&mut self, i: usize, e: RouteElement) {
        self.invalidate();
        self.elements.insert(i, e);
    }

    pub fn remove(&mut self, i: usize) -> RouteElement {
        self.invalidate();
        self.elements.remove(i)
    }

    pub fn truncate(&mut self, len: usize) {
        self.invalidate();
        self.elements.truncate(len);
    }

    pub fn split_off(&mut self, at: usize) -> Route {
        self.invalidate();
        Route::from_elements(self.elements.split_off(at))
    }

    pub fn extend<I: IntoIterator<Item = RouteElement>>(&mut self, iter: I) {
        self.invalidate();
        self.elements.extend(iter);
    }

    fn positions(&self, section: SectionId) -> SmallVec<[usize; 2]> {
        let mut index = self.index.borrow_mut();
        if index.is_none() {
            let mut map: HashMap<SectionId, SmallVec<[usize; 2]>> = HashMap::new();
            for (i, e) in self.elements.iter().enumerate() {
                map.entry(e.section).or_insert_with(SmallVec::new).push(i);
            }
            *index = Some(map);
        }
        index.as_ref()
            .and_then(|m| m.get(&section))
            .cloned()
            .unwrap_or_else(SmallVec::new)
    }

    /// First position of `section` at or after `start`.
    pub fn get_route_index(&self, section: SectionId, start: usize) -> Option<usize> {
        self.positions(section).into_iter().find(|p| *p >= start)
    }

    /// Last position of `section` at or before `start`.
    pub fn get_route_index_backward(&self, section: SectionId, start: usize) -> Option<usize> {
        self.positions(section).into_iter().rev().find(|p| *p <= start)
    }

    pub fn total_length(&self, net: &Network) -> Dist {
        self.elements.iter().map(|e| net.length(e.section)).sum()
    }

    /// Distance between two route positions. `start_offset` is the length
    /// remaining in the start section in the direction of travel,
    /// `end_offset` the length covered in the end section. `None` if the
    /// positions are not ordered for the requested traversal.
    pub fn get_distance_along_route(&self, net: &Network, start: usize, start_offset: Dist,
                                    end: usize, end_offset: Dist, forward: bool) -> Option<Dist> {
        if start == end {
            let length = net.length(self.elements[start].section);
            return Some(start_offset - (length - end_offset));
        }
        let between: Dist = if forward {
            if start > end { return None; }
            self.elements[start + 1..end].iter().map(|e| net.length(e.section)).sum()
        } else {
            if start < end { return None; }
            self.elements[end + 1..start].iter().map(|e| net.length(e.section)).sum()
        };
        Some(start_offset + between + end_offset)
    }

    /// The same track traversed the other way. Exits are recomputed from the
    /// neighbours in the new order.
    pub fn reverse_path(&self, net: &Network) -> Route {
        let n = self.elements.len();
        (0..n).rev().map(|i| {
            let e = &self.elements[i];
            let prev = self.elements.get(i + 1).map(|p| p.section);
            let next = if i > 0 { Some(self.elements[i - 1].section) } else { None };
            RouteElement::new(net, e.section, e.direction.reverse(), prev, next)
        }).collect()
    }

    /// Same section sequence, ignoring the final element.
    pub fn equals_path(&self, other: &Route) -> bool {
        if self.len() != other.len() {
            return false;
        }
        (0..self.len().saturating_sub(1))
            .all(|i| self.elements[i].section == other.elements[i].section)
    }

    /// Same section sequence as `other` read backwards, ignoring the final
    /// element.
    pub fn equals_reverse_path(&self, other: &Route) -> bool {
        let n = self.len();
        if n != other.len() {
            return false;
        }
        (0..n.saturating_sub(1))
            .all(|i| self.elements[i].section == other.elements[n - 1 - i].section)
    }

    /// True if `alt`, laid along this route from `start`, leaves it somewhere.
    pub fn has_actual_diverge_path(&self, alt: &Route, start: usize) -> bool {
        if alt.is_empty() || start >= self.len() {
            return false;
        }
        let (mut i, mut j) = (start, 0);
        if self.elements[i].section != alt.elements[j].section {
            return true;
        }
        while i + 1 < self.len() && j + 1 < alt.len() {
            i += 1;
            j += 1;
            if self.elements[i].section != alt.elements[j].section {
                return true;
            }
        }
        false
    }

    /// Index on this route where `alt` (laid from `first`) leaves it.
    pub fn find_actual_diverge_path(&self, alt: &Route, first: usize, last: usize) -> Option<usize> {
        if self.is_empty() {
            return None;
        }
        let last = last.min(self.len() - 1);
        let mut j = 0;
        for i in first..=last {
            if j >= alt.len() || self.elements[i].section != alt.elements[j].section {
                return Some(i);
            }
            j += 1;
        }
        None
    }

    /// Index on this route where `alt` (ending at `last`) has rejoined it,
    /// found by walking both backwards from their ends.
    pub fn find_actual_converge_path(&self, alt: &Route, first: usize, last: usize) -> Option<usize> {
        if self.is_empty() || alt.is_empty() || first >= self.len() {
            return None;
        }
        let (mut i, mut j) = (last.min(self.len() - 1), alt.len() - 1);
        let mut converge = None;
        loop {
            if self.elements[i].section != alt.elements[j].section {
                break;
            }
            converge = Some(i);
            if i == first || j == 0 {
                break;
            }
            i -= 1;
            j -= 1;
        }
        converge
    }

    /// Length an agent may use from `start` up to the first protecting signal
    /// (less `clearing_margin`), or without a signal, up to the last
    /// junction less its overlap.
    pub fn get_useful_length(&self, net: &Network, clearing_margin: Dist,
                             start: usize, end: Option<usize>) -> UsefulLength {
        if self.is_empty() || start >= self.len() {
            return UsefulLength { length: 0.0, last_index: None };
        }
        let end = end.unwrap_or(self.len() - 1).min(self.len() - 1);

        let mut acc = 0.0;
        let mut result = None;
        let mut last_junction = None;
        for i in start..=end {
            let e = &self.elements[i];
            let s = net.section(e.section);
            if s.is_junction_like() {
                last_junction = Some((i, acc, s.overlap));
            }
            acc += s.length;
            if s.end_signal(e.direction).is_some() {
                result = Some(UsefulLength { length: (acc - clearing_margin).max(0.0), last_index: Some(i) });
                break;
            }
        }

        match (result, last_junction) {
            (Some(r), _) => r,
            (None, Some((i, before, overlap))) if i > start => UsefulLength {
                length: (before - overlap).max(0.0),
                last_index: Some(i - 1),
            },
            (None, _) => UsefulLength { length: acc, last_index: Some(end) },
        }
    }

    /// Replaces positions `start..=end` by `alt`, whose first and last
    /// elements are the same sections. The boundary markers are kept.
    pub fn insert_alternative_path(&mut self, start: usize, end: usize, alt: &Route, path: usize) {
        if alt.is_empty() || start > end || end >= self.len() {
            return;
        }
        let start_marker = self.elements[start].start_alternative_path;
        let end_marker = self.elements[end].end_alternative_path;
        let mut replacement = alt.elements.clone();
        replacement[0].start_alternative_path = start_marker;
        replacement[0].used_alternative_path = Some(path);
        let last = replacement.len() - 1;
        replacement[last].end_alternative_path = end_marker;
        self.invalidate();
        self.elements.splice(start..=end, replacement);
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BoundaryKind {
    Reversal,
    /// Inserted where a leg revisits one of its own sections.
    Loop,
}

/// What is known about the boundary between two consecutive legs.
#[derive(Clone, Debug, PartialEq)]
pub struct ReversalInfo {
    pub kind: BoundaryKind,
    pub valid: bool,
    pub last_divergence: Option<usize>,
    pub first_divergence: Option<usize>,
    pub divergence_section: Option<SectionId>,
    /// Length of the previous leg from the divergence point to its end.
    pub diverge_offset: Dist,
    pub signal_available: bool,
    pub signal_used: bool,
    pub last_signal_index: Option<usize>,
    pub signal_section: Option<SectionId>,
    pub signal: Option<SignalId>,
    pub signal_offset: Dist,
    pub reverse_reversal_offset: Dist,
    pub reversal_index: usize,
    pub reversal_section: SectionId,
}

impl ReversalInfo {
    pub fn synthetic(reversal_index: usize, reversal_section: SectionId) -> ReversalInfo {
        ReversalInfo {
            kind: BoundaryKind::Loop,
            valid: false,
            last_divergence: None,
            first_divergence: None,
            divergence_section: None,
            diverge_offset: 0.0,
            signal_available: false,
            signal_used: false,
            last_signal_index: None,
            signal_section: None,
            signal: None,
            signal_offset: 0.0,
            reverse_reversal_offset: 0.0,
            reversal_index,
            reversal_section,
        }
    }

    /// Analyses the reversal between `last` (the leg ending at the reversal)
    /// and `first` (the leg starting there). The walk back along `last` does
    /// not pass `prev_reversal`, the start of the previous reversal.
    pub fn new(net: &Network, last: &Route, prev_reversal: Option<usize>, first: &Route,
               reverse_reversal_offset: Dist, reversal_index: usize,
               reversal_section: SectionId) -> ReversalInfo {
        let mut info = ReversalInfo {
            kind: BoundaryKind::Reversal,
            reverse_reversal_offset,
            ..ReversalInfo::synthetic(reversal_index, reversal_section)
        };
        if last.is_empty() || first.is_empty() {
            return info;
        }

        // Latest section of `last` which also appears in `first`.
        let mut common = None;
        'search: for li in (0..last.len()).rev() {
            for fi in 0..first.len() {
                if last[li].section == first[fi].section {
                    common = Some((li, fi));
                    info.valid = last[li].direction != first[fi].direction;
                    break 'search;
                }
            }
        }

        let mut valid_point = false;
        if let (true, Some((lc, fc))) = (info.valid, common) {
            let end_last = match prev_reversal {
                Some(p) if p > 0 && p < lc => p,
                _ => 0,
            };
            let (mut li, mut fi) = (lc as isize, fc);
            while li >= end_last as isize && fi < first.len()
                && last[li as usize].section == first[fi].section {
                info.last_divergence = Some(li as usize);
                info.first_divergence = Some(fi);
                info.divergence_section = Some(last[li as usize].section);
                li -= 1;
                fi += 1;
            }
            if fi >= first.len() {
                info.last_divergence = Some(end_last);
                info.divergence_section = Some(last[end_last].section);
            }
            info.valid = info.last_divergence.is_some();
            valid_point = info.valid;
        }

        if valid_point {
            let ld = info.last_divergence.unwrap_or(0);
            info.diverge_offset = last.elements[ld..].iter().map(|e| net.length(e.section)).sum();

            // First signal in the new direction between reversal point and divergence.
            let start = first.iter().position(|e| e.section == reversal_section).unwrap_or(0);
            let stop = info.first_divergence.unwrap_or(0);
            for fi in start..=stop.min(first.len() - 1) {
                let e = &first[fi];
                if let Some(sig) = net.section(e.section).end_signal(e.direction) {
                    info.signal = Some(sig);
                    info.signal_section = Some(e.section);
                    break;
                }
            }

            if let Some(sec) = info.signal_section {
                info.last_signal_index = last.get_route_index(sec, ld);
                if let Some(ls) = info.last_signal_index {
                    info.signal_available = true;
                    info.signal_offset = last.elements[ls..].iter().map(|e| net.length(e.section)).sum();
                }
            }
        } else {
            info.last_divergence = None;
            info.first_divergence = None;
        }

        info
    }
}
