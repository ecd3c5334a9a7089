use super::*;
use super::route::Route;
use std::collections::{BTreeMap, HashMap};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PathKind {
    Main,
    Alternative,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Authorization {
    Public,
    Agent(AgentId),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PassingPath {
    pub name: String,
    pub kind: PathKind,
    pub path: Route,
    pub useful_length: Dist,
    pub end_section: SectionId,
    pub last_useful: Option<usize>,
    pub allowed: Vec<Authorization>,
}

impl PassingPath {
    pub fn allows(&self, agent: AgentId) -> bool {
        self.allowed.iter().any(|a| match *a {
            Authorization::Public => true,
            Authorization::Agent(id) => id == agent,
        })
    }

    fn merge_authorization(&mut self, other: &[Authorization]) {
        for a in other {
            if !self.allowed.contains(a) {
                self.allowed.push(*a);
            }
        }
    }
}

/// The pair of sections where a main path and its passing paths part and
/// meet again. Deadlock traps are anchored on these sections.
#[derive(Clone, Debug, PartialEq)]
pub struct DeadlockBoundary {
    pub start: SectionId,
    pub end: SectionId,
    pub paths: Vec<PassingPath>,
    /// The same boundary seen from the opposite direction.
    pub inverse: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct PassingPaths {
    boundaries: Vec<DeadlockBoundary>,
    by_sections: HashMap<(SectionId, SectionId), usize>,
    section_refs: BTreeMap<SectionId, Vec<usize>>,
}

impl PassingPaths {
    pub fn new() -> PassingPaths {
        Default::default()
    }

    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }

    pub fn iter(&self) -> ::std::slice::Iter<DeadlockBoundary> {
        self.boundaries.iter()
    }

    pub fn get(&self, idx: usize) -> Option<&DeadlockBoundary> {
        self.boundaries.get(idx)
    }

    pub fn boundary_index(&self, start: SectionId, end: SectionId) -> Option<usize> {
        self.by_sections.get(&(start, end)).cloned()
    }

    pub fn boundary(&self, start: SectionId, end: SectionId) -> Option<&DeadlockBoundary> {
        self.boundary_index(start, end).map(|i| &self.boundaries[i])
    }

    /// Boundaries anchored on `section`, at either end.
    pub fn at_section(&self, section: SectionId) -> &[usize] {
        self.section_refs.get(&section).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Adds a path to the boundary `(start, end)`, creating the boundary if
    /// needed. A path with the same name and sections only gains the new
    /// authorizations. Returns `(boundary, path)` indices.
    pub fn register(&mut self, start: SectionId, end: SectionId, path: PassingPath) -> (usize, usize) {
        let b = match self.boundary_index(start, end) {
            Some(b) => b,
            None => {
                let b = self.boundaries.len();
                let inverse = self.boundary_index(end, start);
                self.boundaries.push(DeadlockBoundary { start, end, paths: Vec::new(), inverse });
                if let Some(inv) = inverse {
                    self.boundaries[inv].inverse = Some(b);
                }
                self.by_sections.insert((start, end), b);
                for s in &[start, end] {
                    let refs = self.section_refs.entry(*s).or_insert_with(Vec::new);
                    if !refs.contains(&b) {
                        refs.push(b);
                    }
                }
                b
            }
        };

        let paths = &mut self.boundaries[b].paths;
        if let Some(p) = paths.iter().position(|p| p.name == path.name && p.path.equals_path(&path.path)) {
            paths[p].merge_authorization(&path.allowed);
            return (b, p);
        }
        paths.push(path);
        (b, paths.len() - 1)
    }

    pub fn paths_for(&self, start: SectionId, end: SectionId, agent: AgentId) -> Vec<&PassingPath> {
        self.boundary(start, end)
            .map(|b| b.paths.iter().filter(|p| p.allows(agent)).collect())
            .unwrap_or_else(Vec::new)
    }

    /// True if some alternative path at the boundary is open to `agent` and
    /// long enough to hold it.
    pub fn fits(&self, start: SectionId, end: SectionId, agent: AgentId, length: Dist) -> bool {
        self.paths_for(start, end, agent).iter()
            .any(|p| p.kind == PathKind::Alternative && p.useful_length >= length)
    }
}
