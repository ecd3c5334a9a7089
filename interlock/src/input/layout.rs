use crate::railway::{Dist, SectionId, SignalId, Direction, Location};

use std::collections::HashMap;
use std::hash::Hash;
use std::fmt::Debug;

pub type NameMap<Ref> = HashMap<Ref, usize>;

/// Static description of a track layout, as delivered by a layout file or
/// any other external source. Section indices are positions in `sections`.
#[derive(Debug, Default)]
pub struct TrackLayout {
    pub sections: Vec<SectionSpec>,
    pub links: Vec<Link>,
    pub items: Vec<ItemSpec>,
    pub annotations: Vec<(SectionId, Annotation)>,
    pub shapes: Vec<CrossoverShape>,
    pub seams: Vec<PinRef>,
    pub crossovers: Vec<CrossoverSpec>,
}

#[derive(Debug)]
pub struct LayoutNames<Ref: Hash + Eq + Debug> {
    pub section_names: NameMap<Ref>,
    pub signal_names: NameMap<Ref>,
    pub item_names: NameMap<Ref>,
    pub shape_names: NameMap<Ref>,
}

impl<Ref: Hash + Eq + Debug> Default for LayoutNames<Ref> {
    fn default() -> Self {
        LayoutNames {
            section_names: HashMap::new(),
            signal_names: HashMap::new(),
            item_names: HashMap::new(),
            shape_names: HashMap::new(),
        }
    }
}

impl LayoutNames<String> {
    pub fn section_name(&self, idx: SectionId) -> Option<&str> {
        self.section_names.iter().find(|&(_, v)| *v == idx).map(|(k, _)| k.as_str())
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CircuitType {
    Normal,
    Junction,
    Crossover,
    EndOfTrack,
    Empty,
}

#[derive(Debug, Clone)]
pub struct SectionSpec {
    pub kind: CircuitType,
    pub length: Dist,
    pub overlap: Dist,
    pub switch: Option<usize>,
}

/// One pin slot: leaving `section` in `direction` through `location`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PinRef {
    pub section: SectionId,
    pub direction: Direction,
    pub location: Location,
}

/// Connects the exit slot `from` to the section in `to`, which is entered
/// travelling `to.direction`. The reciprocal slot on the target side is
/// `(to.section, to.direction.reverse(), to.location)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Link {
    pub from: PinRef,
    pub to: PinRef,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ItemKind {
    Signal(SignalId),
    SpeedPost(usize),
    MilePost(usize),
}

/// An item attached to a section. Offsets are measured from the near end.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrackItem {
    pub kind: ItemKind,
    pub direction: Option<Direction>,
    pub offset: Dist,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ItemSpec {
    pub section: SectionId,
    pub item: TrackItem,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AnnotationKind {
    Platform(usize),
    Tunnel,
    Trough,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Annotation {
    pub kind: AnnotationKind,
    pub start: Dist,
    pub end: Dist,
}

#[derive(Copy, Clone, Debug, PartialEq, Default)]
pub struct CrossoverShape {
    pub overlap: Option<Dist>,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CrossoverSpec {
    pub first: PinRef,
    pub second: PinRef,
    pub shape: Option<usize>,
}
