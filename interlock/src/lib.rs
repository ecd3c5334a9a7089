extern crate smallvec;
extern crate ordered_float;
extern crate regex;
extern crate rayon;
extern crate failure;
#[macro_use] extern crate failure_derive;
extern crate log;

pub mod input;
pub mod output;
pub mod railway;

#[cfg(test)]
mod tests;

use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

use log::info;
use input::layout::{LayoutNames, TrackLayout};
use output::history::{History, InterlockingLogEvent};
use railway::agent::{Agent, AgentKind};
use railway::builder::{AbstractPath, BuilderConfig, RoutePath};
use railway::network::Network;
use railway::passing::PassingPaths;
use railway::reservation::{Interlocking, NoWayside};

/// A built route path together with the network it was built on and the
/// events of a trial reservation along its first leg.
pub struct Evaluation {
    pub network: Network,
    pub passing: PassingPaths,
    pub route_path: RoutePath,
    pub history: History,
    /// Number of sections of the first leg the trial agent could reserve.
    pub reserved: usize,
}

/// Builds the route path and lets a single agent reserve its first leg, in
/// order, until a section is refused. The reservations stay in the returned
/// network.
pub fn evaluate_path(layout: &TrackLayout, path: &AbstractPath, config: &BuilderConfig) -> AppResult<Evaluation> {
    let network = Network::new(layout)?;
    let mut passing = PassingPaths::new();
    let route_path = railway::builder::build(&network, path, config, &mut passing)?;

    let inf_log: Rc<RefCell<Vec<InterlockingLogEvent>>> = Rc::new(RefCell::new(Vec::new()));
    let logger = {
        let log = inf_log.clone();
        Box::new(move |e: InterlockingLogEvent| log.borrow_mut().push(e))
    };
    let mut il = Interlocking::new(network, Box::new(NoWayside), logger);
    il.passing = passing;

    let mut reserved = 0;
    if let Some(leg) = route_path.legs.first() {
        let agent = 0;
        il.add_agent(Agent::new(agent, AgentKind::Ai { started: true }, config.agent_length, leg.clone()));
        il.plan_deadlocks(agent);
        for e in leg {
            if !il.is_available(e.section, agent) || !il.reserve(e.section, agent) {
                info!("Trial reservation stopped at section {}.", e.section);
                break;
            }
            reserved += 1;
        }
    }

    let history = History { events: inf_log.replace(Vec::new()) };
    Ok(Evaluation { network: il.network, passing: il.passing, route_path, history, reserved })
}

pub type AppResult<T> = Result<T, failure::Error>;

pub fn read_file(f: &Path) -> AppResult<String> {
    use std::fs::File;
    use std::io::prelude::*;
    use std::io::BufReader;

    let file = File::open(f)?;
    let mut file = BufReader::new(&file);
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    Ok(contents)
}

pub fn get_layout(s: &Path) -> AppResult<(TrackLayout, LayoutNames<String>)> {
    let contents = read_file(s)?;
    get_layout_string(&contents)
}

pub fn get_layout_string(s: &str) -> AppResult<(TrackLayout, LayoutNames<String>)> {
    use input::layout_parser::{lexer, parse, model_from_ast};
    let lex = lexer(&mut s.chars())?;
    let stmts = parse(&lex)?;
    let model = model_from_ast(&stmts)?;
    Ok(model)
}

pub fn get_path(s: &Path, names: &LayoutNames<String>) -> AppResult<AbstractPath> {
    let contents = read_file(s)?;
    let p = input::path_parser::parse_path(&contents, names)?;
    Ok(p)
}
