use super::{AgentId, Direction, SignalId};
use std::collections::{BTreeMap, VecDeque};

/// Per-section dynamic state: who is on it, who holds it, who is queued for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionState {
    pub occupation: BTreeMap<AgentId, Direction>,
    pub reserved: Option<AgentId>,
    pub signal_reserved: Option<SignalId>,
    pub pre_reserved: VecDeque<AgentId>,
    pub claimed: VecDeque<AgentId>,
    pub forced: bool,
}

impl SectionState {
    pub fn is_occupied(&self) -> bool {
        !self.occupation.is_empty()
    }

    pub fn is_occupied_by(&self, agent: AgentId) -> bool {
        self.occupation.contains_key(&agent)
    }

    pub fn is_occupied_by_other(&self, agent: AgentId) -> bool {
        self.occupation.keys().any(|a| *a != agent)
    }

    pub fn is_reserved_by(&self, agent: AgentId) -> bool {
        self.reserved == Some(agent)
    }

    /// Neither occupied nor held by an agent or a signal.
    pub fn is_free(&self) -> bool {
        self.occupation.is_empty() && self.reserved.is_none() && self.signal_reserved.is_none()
    }

    /// Occupied or reserved by the agent, or (with `claim_ok`) claimed by it.
    pub fn is_set(&self, agent: AgentId, claim_ok: bool) -> bool {
        self.is_occupied_by(agent)
            || self.is_reserved_by(agent)
            || (claim_ok && self.claimed.contains(&agent))
    }

    pub fn claim_head(&self) -> Option<AgentId> {
        self.claimed.front().cloned()
    }

    pub fn enqueue_claim(&mut self, agent: AgentId) -> bool {
        enqueue_unique(&mut self.claimed, agent)
    }

    pub fn remove_claim(&mut self, agent: AgentId) -> bool {
        remove_from_queue(&mut self.claimed, agent)
    }

    pub fn enqueue_pre_reservation(&mut self, agent: AgentId) -> bool {
        enqueue_unique(&mut self.pre_reserved, agent)
    }

    pub fn remove_pre_reservation(&mut self, agent: AgentId) -> bool {
        remove_from_queue(&mut self.pre_reserved, agent)
    }

    /// Every agent referenced by this state, in a stable order.
    pub fn agents(&self) -> Vec<AgentId> {
        let mut v: Vec<AgentId> = self.occupation.keys().cloned()
            .chain(self.reserved)
            .chain(self.pre_reserved.iter().cloned())
            .chain(self.claimed.iter().cloned())
            .collect();
        v.sort();
        v.dedup();
        v
    }
}

fn enqueue_unique(q: &mut VecDeque<AgentId>, agent: AgentId) -> bool {
    if q.contains(&agent) {
        false
    } else {
        q.push_back(agent);
        true
    }
}

fn remove_from_queue(q: &mut VecDeque<AgentId>, agent: AgentId) -> bool {
    let before = q.len();
    q.retain(|a| *a != agent);
    q.len() != before
}

/// Deadlock bookkeeping held at an anchor section.
///
/// `traps` maps an agent to the agents that have trapped it here: while the
/// key is present, the agent may not acquire this section.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeadlockState {
    pub traps: BTreeMap<AgentId, Vec<AgentId>>,
    pub actives: Vec<AgentId>,
    pub awaited: Vec<AgentId>,
}

impl DeadlockState {
    pub fn is_trapped(&self, agent: AgentId) -> bool {
        self.traps.contains_key(&agent)
    }

    /// `agent` traps `partner` here. Returns false if that trap already existed.
    pub fn set_trap(&mut self, agent: AgentId, partner: AgentId) -> bool {
        let trap = self.traps.entry(partner).or_insert_with(Vec::new);
        if trap.contains(&agent) {
            return false;
        }
        trap.push(agent);
        if !self.actives.contains(&agent) {
            self.actives.push(agent);
        }
        self.await_release(partner);
        true
    }

    /// Removes every trap `agent` has set here. Returns the agents which are
    /// no longer trapped at all.
    pub fn clear_trap(&mut self, agent: AgentId) -> Vec<AgentId> {
        let mut released = Vec::new();
        if let Some(pos) = self.actives.iter().position(|a| *a == agent) {
            self.actives.remove(pos);
            for (trapped, setters) in self.traps.iter_mut() {
                setters.retain(|a| *a != agent);
                if setters.is_empty() {
                    released.push(*trapped);
                }
            }
        }
        for trapped in &released {
            self.traps.remove(trapped);
            self.awaited.retain(|a| a != trapped);
        }
        released
    }

    pub fn await_release(&mut self, agent: AgentId) {
        if !self.awaited.contains(&agent) {
            self.awaited.push(agent);
        }
    }

    /// True if any agent other than `agent` is waiting for a trap here.
    pub fn check_awaited(&self, agent: AgentId) -> bool {
        self.awaited.iter().any(|a| *a != agent)
    }

    pub fn is_empty(&self) -> bool {
        self.traps.is_empty() && self.actives.is_empty() && self.awaited.is_empty()
    }
}
