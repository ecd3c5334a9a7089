use crate::input::layout::*;
use crate::output::history::InterlockingLogEvent;
use crate::railway::agent::{Agent, AgentKind, DeadlockTarget};
use crate::railway::builder::*;
use crate::railway::network::Network;
use crate::railway::passing::{Authorization, PassingPaths};
use crate::railway::reservation::{Interlocking, NoWayside, Wayside};
use crate::railway::route::{BoundaryKind, Route};
use crate::railway::*;

use maplit::{btreemap, hashmap};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

type Log = Rc<RefCell<Vec<InterlockingLogEvent>>>;

fn pin(section: SectionId, direction: Direction, location: Location) -> PinRef {
    PinRef { section, direction, location }
}

fn ahead(section: SectionId) -> PinRef {
    pin(section, Direction::Ahead, Location::Near)
}

fn normal(length: Dist) -> SectionSpec {
    SectionSpec { kind: CircuitType::Normal, length, overlap: 0.0, switch: None }
}

fn junction(switch: usize) -> SectionSpec {
    SectionSpec { kind: CircuitType::Junction, length: 0.0, overlap: 0.0, switch: Some(switch) }
}

fn line(n: usize, length: Dist) -> TrackLayout {
    let mut layout = TrackLayout::default();
    for _ in 0..n {
        layout.sections.push(normal(length));
    }
    for i in 1..n {
        layout.links.push(Link { from: ahead(i - 1), to: ahead(i) });
    }
    layout
}

fn engine_with(net: Network, wayside: Box<dyn Wayside>) -> (Interlocking, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let l = log.clone();
    (Interlocking::new(net, wayside, Box::new(move |e| l.borrow_mut().push(e))), log)
}

fn agent(il: &mut Interlocking, id: AgentId, sections: &[SectionId]) {
    let v: Vec<(SectionId, Direction)> = sections.iter().map(|s| (*s, Direction::Ahead)).collect();
    let route = Route::from_sections(&il.network, &v);
    il.add_agent(Agent::new(id, AgentKind::Ai { started: true }, 50.0, route));
}

fn start(section: SectionId, direction: Direction) -> Waypoint {
    Waypoint { section, direction: Some(direction), offset: None, kind: WaypointKind::Start }
}

fn wp(section: SectionId, kind: WaypointKind) -> Waypoint {
    Waypoint { section, direction: None, offset: None, kind }
}

#[test]
fn single_track_section_is_handed_over() {
    let net = Network::new(&line(8, 100.0)).unwrap();
    let (mut il, log) = engine_with(net, Box::new(NoWayside));
    let (a, b) = (1, 2);
    agent(&mut il, a, &[5, 6, 7]);
    agent(&mut il, b, &[4, 5, 6]);

    assert!(il.is_available(5, a));
    assert!(il.reserve(5, a));
    assert!(il.is_available(5, a));
    assert!(!il.is_available(5, b));
    assert!(!il.reserve(5, b));

    il.set_occupied(5, a, 0.0);
    assert!(!il.is_available(5, b));
    assert!(il.clear_occupied(5, a));
    assert!(il.network.section(5).state.pre_reserved.is_empty());
    assert!(il.network.section(5).state.is_free());

    assert!(il.is_available(5, b));
    assert!(il.reserve(5, b));
    assert_eq!(il.network.section(5).state.reserved, Some(b));
    assert!(log.borrow().contains(&InterlockingLogEvent::Occupied(5, a, false)));
}

#[derive(Clone, Default)]
struct Recorder {
    throws: Rc<RefCell<Vec<(SectionId, usize, usize)>>>,
}

impl Wayside for Recorder {
    fn throw_switch(&mut self, junction: SectionId, switch: usize, position: usize) {
        self.throws.borrow_mut().push((junction, switch, position));
    }
}

/// 0 -> J(1) -> 2 on the near exit, 3 on the far exit.
fn junction_layout() -> TrackLayout {
    let mut layout = line(3, 100.0);
    layout.sections[1] = junction(4);
    layout.sections.push(normal(100.0));
    layout.links.push(Link { from: pin(1, Direction::Ahead, Location::Far), to: ahead(3) });
    layout
}

#[test]
fn junction_reservation_throws_switch_once() {
    for &(target, exit) in &[(2, Location::Near), (3, Location::Far)] {
        let net = Network::new(&junction_layout()).unwrap();
        let recorder = Recorder::default();
        let throws = recorder.throws.clone();
        let (mut il, _) = engine_with(net, Box::new(recorder));
        agent(&mut il, 1, &[0, 1, target]);

        let e = il.agent(1).route[1];
        assert!(e.facing_point);
        assert_eq!(e.exit(), exit);

        assert!(il.reserve(1, 1));
        assert!(il.reserve(1, 1));
        assert_eq!(*throws.borrow(), vec![(1, 4, exit.index())]);
        assert_eq!(il.network.section(1).aligned_exit(), Some(exit));
    }
}

/// 0 -> J(1) -> 2, with a siding 3 joining J(1) from the far slot of its
/// trailing side.
fn siding_layout() -> TrackLayout {
    let mut layout = TrackLayout::default();
    layout.sections = vec![normal(100.0), junction(0), normal(80.0), normal(70.0)];
    layout.links.push(Link { from: ahead(0), to: ahead(1) });
    layout.links.push(Link { from: ahead(1), to: ahead(2) });
    layout.links.push(Link { from: ahead(3), to: pin(1, Direction::Ahead, Location::Far) });
    layout
}

#[test]
fn reversal_gives_two_legs() {
    let net = Network::new(&siding_layout()).unwrap();
    assert!(net.check_pins().is_empty());
    let path = AbstractPath {
        waypoints: vec![start(0, Direction::Ahead), wp(2, WaypointKind::Reversal), wp(3, WaypointKind::End)],
        alternatives: vec![],
    };
    let cfg = BuilderConfig { agent_length: 50.0, ..Default::default() };
    let r = build(&net, &path, &cfg, &mut PassingPaths::new()).unwrap();

    assert_eq!(r.legs.len(), 2);
    assert_eq!(r.legs[0].sections(), vec![0, 1, 2]);
    assert_eq!(r.legs[1].sections(), vec![2, 1, 3]);
    assert!(r.legs[1][1].facing_point);

    let info = &r.reversals[0];
    assert_eq!(info.kind, BoundaryKind::Reversal);
    assert!(info.valid);
    assert_eq!(info.divergence_section, Some(1));
    assert_eq!(info.last_divergence, Some(1));
    assert_eq!(info.first_divergence, Some(1));
    assert_eq!(info.diverge_offset, 0.0 + 80.0);
    assert_eq!(info.reverse_reversal_offset, 80.0);
}

#[test]
fn plain_reversal_diverges_at_leg_start() {
    // Straight back along the same track: the legs share everything.
    let net = Network::new(&line(3, 100.0)).unwrap();
    let path = AbstractPath {
        waypoints: vec![start(0, Direction::Ahead), wp(2, WaypointKind::Reversal),
                        Waypoint { section: 2, direction: Some(Direction::Reverse), offset: None,
                                   kind: WaypointKind::End }],
        alternatives: vec![],
    };
    let r = build(&net, &path, &BuilderConfig::default(), &mut PassingPaths::new()).unwrap();
    assert_eq!(r.legs.len(), 2);
    assert_eq!(r.legs[1].sections(), vec![2]);
    let info = &r.reversals[0];
    assert!(info.valid);
    assert_eq!(info.last_divergence, Some(0));
    assert_eq!(info.divergence_section, Some(0));
    assert_eq!(info.diverge_offset, 300.0);
}

/// A(0) -> J1(1) -> B(2) -> C(4) -> J2(6) -> D(7), with the loop
/// J1 -> X(3) -> Y(5) -> J2 on the far slots.
fn loop_layout() -> (TrackLayout, HashMap<&'static str, SectionId>) {
    let names = hashmap! {
        "A" => 0, "J1" => 1, "B" => 2, "X" => 3, "C" => 4, "Y" => 5, "J2" => 6, "D" => 7,
    };
    let mut layout = TrackLayout::default();
    layout.sections = vec![normal(100.0), junction(0), normal(50.0), normal(60.0),
                           normal(50.0), normal(60.0), junction(1), normal(100.0)];
    let n = |s: &str| names[s];
    for &(a, b) in &[("A", "J1"), ("J1", "B"), ("B", "C"), ("X", "Y"), ("C", "J2"), ("J2", "D")] {
        layout.links.push(Link { from: ahead(n(a)), to: ahead(n(b)) });
    }
    layout.links.push(Link { from: pin(n("J1"), Direction::Ahead, Location::Far), to: ahead(n("X")) });
    layout.links.push(Link { from: ahead(n("Y")), to: pin(n("J2"), Direction::Ahead, Location::Far) });
    (layout, names)
}

fn loop_path(choice: Location) -> AbstractPath {
    AbstractPath {
        waypoints: vec![start(0, Direction::Ahead), wp(1, WaypointKind::Junction(Location::Near)),
                        wp(7, WaypointKind::End)],
        alternatives: vec![AlternativeSpec {
            name: "loop".to_string(),
            from: 1,
            to: 6,
            choices: vec![(1, choice)],
            authorization: vec![Authorization::Public],
        }],
    }
}

#[test]
fn diverging_passing_path_is_accepted() {
    let (layout, names) = loop_layout();
    let net = Network::new(&layout).unwrap();
    assert!(net.check_pins().is_empty());
    let mut passing = PassingPaths::new();
    let r = build(&net, &loop_path(Location::Far), &BuilderConfig::default(), &mut passing).unwrap();

    let main = &r.legs[0];
    assert_eq!(main.sections(), vec![names["A"], names["J1"], names["B"], names["C"], names["J2"], names["D"]]);
    assert_eq!(r.alternative_paths.len(), 1);
    let alt = &r.alternative_paths[0];
    assert_eq!(alt.route.sections(), vec![names["J1"], names["X"], names["Y"], names["J2"]]);
    assert_eq!((alt.start_index, alt.end_index), (1, 4));
    assert_eq!(main.find_actual_diverge_path(&alt.route, alt.start_index, alt.end_index), Some(2));

    let boundary = passing.boundary(1, 6).unwrap();
    assert_eq!(boundary.paths.len(), 2);
    assert!(passing.fits(1, 6, 9, 100.0));
    assert!(!passing.fits(1, 6, 9, 130.0));
    assert_eq!(main[1].start_alternative_path.map(|a| a.section), Some(6));
    assert_eq!(main[4].end_alternative_path.map(|a| a.section), Some(1));
}

thread_local! {
    static WARNINGS: RefCell<Vec<String>> = RefCell::new(Vec::new());
}

/// Collects warnings logged on the current test thread.
struct WarningCapture;

impl log::Log for WarningCapture {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            WARNINGS.with(|w| w.borrow_mut().push(record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

static CAPTURE: WarningCapture = WarningCapture;

fn capture_warnings() {
    let _ = log::set_logger(&CAPTURE);
    log::set_max_level(log::LevelFilter::Warn);
    WARNINGS.with(|w| w.borrow_mut().clear());
}

fn warnings() -> Vec<String> {
    WARNINGS.with(|w| w.borrow().clone())
}

#[test]
fn identical_passing_path_is_rejected() {
    let (layout, _) = loop_layout();
    let net = Network::new(&layout).unwrap();
    let mut passing = PassingPaths::new();
    let accepted = build(&net, &loop_path(Location::Far), &BuilderConfig::default(), &mut PassingPaths::new()).unwrap();
    capture_warnings();
    let r = build(&net, &loop_path(Location::Near), &BuilderConfig::default(), &mut passing).unwrap();

    assert_eq!(warnings(), vec!["Passing path \"loop\" does not diverge from the main path; ignored.".to_string()]);
    assert!(r.alternative_paths.is_empty());
    assert!(passing.is_empty());
    assert_eq!(r.legs[0].sections(), accepted.legs[0].sections());
    assert!(r.legs[0].iter().all(|e| e.start_alternative_path.is_none()));
}

/// Agent 1 runs A to D along the main line, agent 2 the same track back.
fn opposing_agents_on_loop(length: Dist) -> Interlocking {
    let (layout, _) = loop_layout();
    let net = Network::new(&layout).unwrap();
    let mut passing = PassingPaths::new();
    let r = build(&net, &loop_path(Location::Far), &BuilderConfig::default(), &mut passing).unwrap();
    let forth = r.legs[0].clone();
    let back = forth.reverse_path(&net);
    assert_eq!(back.sections(), vec![7, 6, 4, 2, 1, 0]);

    let (mut il, _) = engine_with(net, Box::new(NoWayside));
    il.passing = passing;
    il.add_agent(Agent::new(1, AgentKind::Ai { started: true }, length, forth));
    il.add_agent(Agent::new(2, AgentKind::Ai { started: true }, length, back));
    il
}

#[test]
fn opposing_agents_are_held_apart_by_the_passing_loop() {
    let mut il = opposing_agents_on_loop(50.0);
    assert_eq!(il.plan_deadlocks(1), 2);
    assert_eq!(il.agent(1).deadlock_info, btreemap! {
        0 => vec![DeadlockTarget { partner: 2, end_section: 1 }],
        6 => vec![DeadlockTarget { partner: 2, end_section: 7 }],
    });

    assert!(il.reserve(0, 1));
    assert!(il.network.section(1).deadlock.is_trapped(2));
    assert!(!il.is_available(1, 2));
    assert!(!il.network.section(7).deadlock.is_trapped(2));

    // Reserving the start of the loop arms the trap at its far side.
    assert!(il.reserve(1, 1));
    assert!(il.network.section(7).deadlock.is_trapped(2));

    il.set_occupied(1, 1, 0.0);
    assert!(il.clear_occupied(1, 1));
    assert!(!il.network.section(1).deadlock.is_trapped(2));
    assert!(il.is_available(1, 2));
    assert!(il.network.section(7).deadlock.is_trapped(2));
}

#[test]
fn agents_too_long_for_the_loop_contest_the_whole_line() {
    let mut il = opposing_agents_on_loop(130.0);
    assert_eq!(il.plan_deadlocks(1), 1);
    assert_eq!(il.agent(1).deadlock_info, btreemap! {
        0 => vec![DeadlockTarget { partner: 2, end_section: 7 }],
    });
    il.reserve(0, 1);
    assert!(il.network.section(7).deadlock.is_trapped(2));
    assert!(!il.is_available(7, 2));
}

#[test]
fn static_agents_are_not_planned_against() {
    let mut il = opposing_agents_on_loop(50.0);
    il.agent_mut(2).kind = AgentKind::Static;
    assert_eq!(il.plan_deadlocks(1), 0);
    assert!(il.agent(1).deadlock_info.is_empty());
}

#[test]
fn reservation_is_exclusive_for_every_section() {
    let net = Network::new(&line(6, 50.0)).unwrap();
    let (mut il, _) = engine_with(net, Box::new(NoWayside));
    agent(&mut il, 1, &[0, 1, 2, 3, 4, 5]);
    agent(&mut il, 2, &[0, 1, 2, 3, 4, 5]);
    for s in 0..6 {
        assert!(il.reserve(s, 1));
        assert!(il.is_available(s, 1));
        assert!(!il.is_available(s, 2));
    }
    for s in 0..6 {
        assert!(il.unreserve(s, 1));
        assert!(il.is_available(s, 2));
    }
}

#[test]
fn reversing_twice_keeps_sections() {
    let (layout, _) = loop_layout();
    let net = Network::new(&layout).unwrap();
    let routes: Vec<Vec<SectionId>> = vec![vec![0, 1, 2, 4, 6, 7], vec![0, 1, 3, 5, 6, 7], vec![3, 5], vec![7]];
    for secs in routes {
        let v: Vec<(SectionId, Direction)> = secs.iter().map(|s| (*s, Direction::Ahead)).collect();
        let r = Route::from_sections(&net, &v);
        let back = r.reverse_path(&net).reverse_path(&net);
        assert_eq!(back.sections(), secs);
        assert!(back.iter().zip(r.iter()).all(|(a, b)| a.direction == b.direction && a.exit() == b.exit()));
    }
}

#[test]
fn distance_within_one_section() {
    let net = Network::new(&line(3, 120.0)).unwrap();
    let r = Route::from_sections(&net, &[(0, Direction::Ahead), (1, Direction::Ahead), (2, Direction::Ahead)]);
    for i in 0..3 {
        for &(s, e) in &[(0.0, 0.0), (120.0, 120.0), (40.0, 100.0), (100.0, 40.0)] {
            assert_eq!(r.get_distance_along_route(&net, i, s, i, e, true), Some(s - (120.0 - e)));
        }
    }
}

#[test]
fn clearing_the_partner_trap_releases_the_agent() {
    let net = Network::new(&line(4, 100.0)).unwrap();
    let (mut il, log) = engine_with(net, Box::new(NoWayside));
    agent(&mut il, 1, &[0, 1, 2, 3]);
    agent(&mut il, 2, &[3, 2, 1, 0]);

    assert!(il.set_deadlock_trap(2, 1, 2));
    assert!(il.set_deadlock_trap(1, 2, 1));
    assert!(!il.is_available(2, 2));
    assert!(!il.is_available(1, 1));
    assert!(il.check_deadlock_awaited(2, 1));

    assert_eq!(il.clear_deadlock_trap(2, 1), vec![2]);
    assert!(il.is_available(2, 2));
    assert!(!il.is_available(1, 1));
    assert_eq!(il.clear_deadlock_trap(1, 2), vec![1]);
    assert!(il.is_available(1, 1));
    assert!(log.borrow().contains(&InterlockingLogEvent::Trap(2, 1, 2, false)));
}

#[test]
fn split_preserves_length_and_items() {
    for &p in &[-5.0, 0.0, 0.005, 30.0, 50.0, 99.999, 100.0, 150.0] {
        let mut layout = line(3, 100.0);
        let offsets = btreemap! { 0 => 0.0, 1 => 29.0, 2 => 50.0, 3 => 100.0 };
        for (&id, &offset) in &offsets {
            layout.items.push(ItemSpec { section: 1, item: TrackItem {
                kind: ItemKind::MilePost(id), direction: None, offset } });
        }
        let mut net = Network::new(&layout).unwrap();
        let new = net.split(1, p).unwrap();
        assert!((net.length(1) + net.length(new) - 100.0).abs() < 0.01);
        assert!(net.length(1) >= 0.01 && net.length(new) >= 0.01);

        let mut seen: BTreeMap<usize, usize> = BTreeMap::new();
        for &s in &[1, new] {
            for item in &net.section(s).items {
                assert!(item.offset >= 0.0);
                assert!(item.offset <= net.length(s) + 0.01);
                if let ItemKind::MilePost(id) = item.kind {
                    *seen.entry(id).or_insert(0) += 1;
                }
            }
        }
        assert_eq!(seen, btreemap! { 0 => 1, 1 => 1, 2 => 1, 3 => 1 });
        assert!(net.check_pins().is_empty());
    }
}

#[test]
fn loop_legs_concatenate_to_the_revisiting_sequence() {
    // Balloon: 0 -> J(1) near -> 2 -> 3 -> back into J(1) far -> 0.
    let mut layout = TrackLayout::default();
    layout.sections = vec![normal(100.0), junction(0), normal(100.0), normal(100.0)];
    layout.links.push(Link { from: ahead(0), to: ahead(1) });
    layout.links.push(Link { from: ahead(1), to: ahead(2) });
    layout.links.push(Link { from: ahead(2), to: ahead(3) });
    layout.links.push(Link { from: ahead(3), to: pin(1, Direction::Reverse, Location::Far) });
    let net = Network::new(&layout).unwrap();

    let path = AbstractPath {
        waypoints: vec![start(0, Direction::Ahead), wp(1, WaypointKind::Junction(Location::Near)),
                        Waypoint { section: 0, direction: Some(Direction::Reverse), offset: None,
                                   kind: WaypointKind::End }],
        alternatives: vec![],
    };
    let r = build(&net, &path, &BuilderConfig::default(), &mut PassingPaths::new()).unwrap();
    assert_eq!(r.legs.len(), 2);
    assert!(r.reversals.iter().all(|x| x.kind == BoundaryKind::Loop));
    assert_eq!(r.sections(), vec![0, 1, 2, 3, 1, 0]);
}

#[test]
fn layout_text_to_trial_reservation() {
    let layout_text = "
        section a normal 100
        section j junction 0 switch 0
        section b normal 50
        section x normal 60
        link a ahead near to j ahead near
        link j ahead near to b ahead near
        link j ahead far to x ahead near
        signal s1 at b ahead 45
    ";
    let (layout, names) = crate::get_layout_string(layout_text).unwrap();
    let path = crate::input::path_parser::parse_path("start a ahead\nend b", &names).unwrap();
    let eval = crate::evaluate_path(&layout, &path, &BuilderConfig::default()).unwrap();

    assert_eq!(eval.route_path.sections(), vec![names.section_names["a"], names.section_names["j"],
                                                names.section_names["b"]]);
    assert_eq!(eval.reserved, 3);
    let j = names.section_names["j"];
    assert_eq!(eval.network.section(j).aligned_exit(), Some(Location::Near));
    assert!(eval.history.events.contains(&InterlockingLogEvent::Switch(0, Location::Near)));
}
