//! Track circuits, reservations and routes.

pub mod network;
pub mod state;
pub mod agent;
pub mod clearing;
pub mod reservation;
pub mod route;
pub mod builder;
pub mod passing;

pub type SectionId = usize;
pub type AgentId = usize;
pub type SignalId = usize;
pub type Dist = f64;

/// Direction of travel through a section. `Ahead` runs from the near end
/// (offset 0) to the far end (offset = length).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Ahead,
    Reverse,
}

impl Direction {
    pub fn reverse(self) -> Direction {
        match self {
            Direction::Ahead => Direction::Reverse,
            Direction::Reverse => Direction::Ahead,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Direction::Ahead => 0,
            Direction::Reverse => 1,
        }
    }

    pub fn from_index(i: usize) -> Option<Direction> {
        match i {
            0 => Some(Direction::Ahead),
            1 => Some(Direction::Reverse),
            _ => None,
        }
    }

    pub fn both() -> [Direction; 2] {
        [Direction::Ahead, Direction::Reverse]
    }
}

/// Which of the (at most two) connections at one end of a section a pin
/// occupies. Plain sections only use `Near`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Location {
    Near,
    Far,
}

impl Location {
    pub fn index(self) -> usize {
        match self {
            Location::Near => 0,
            Location::Far => 1,
        }
    }

    pub fn from_index(i: usize) -> Option<Location> {
        match i {
            0 => Some(Location::Near),
            1 => Some(Location::Far),
            _ => None,
        }
    }

    pub fn both() -> [Location; 2] {
        [Location::Near, Location::Far]
    }
}
