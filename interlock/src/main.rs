extern crate interlock;
extern crate failure;
extern crate log;
extern crate structopt;

use interlock::*;
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::path::PathBuf;
use structopt::StructOpt;

/// Interlock -- route building and track circuit reservation
#[derive(StructOpt, Debug)]
#[structopt(name = "interlock")]
struct Opt {
    /// Verbose mode (-v, -vv, -vvv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    /// Track layout file
    #[structopt(parse(from_os_str))]
    layout: PathBuf,

    /// Waypoint path file
    #[structopt(parse(from_os_str))]
    path: PathBuf,

    /// Agent length used for trimming and the trial reservation
    #[structopt(short = "l", long = "length")]
    length: Option<f64>,

    /// Clearing margin subtracted in front of protecting signals
    #[structopt(short = "m", long = "margin")]
    margin: Option<f64>,

    /// Output the built route path as JSON
    #[structopt(short = "j", long = "json", parse(from_os_str))]
    json: Option<PathBuf>,

    /// Output a binary snapshot of the network state and route path
    #[structopt(short = "s", long = "snapshot", parse(from_os_str))]
    snapshot: Option<PathBuf>,
}

struct StderrLog;

impl Log for StderrLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("{:<5} {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLog = StderrLog;

fn init_log(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn run(opt: &Opt) -> AppResult<()> {
    use interlock::railway::builder::BuilderConfig;

    let (layout, names) = get_layout(&opt.layout)?;
    if opt.verbose >= 3 {
        println!("Layout:");
        for (i, x) in layout.sections.iter().enumerate() {
            println!("  {} {:?}", names.section_name(i).unwrap_or("?"), x);
        }
    }

    let path = get_path(&opt.path, &names)?;
    if opt.verbose >= 2 {
        println!("Path:");
        for x in &path.waypoints { println!("  - {:?}", x); }
        for x in &path.alternatives { println!("  - {:?}", x); }
    }

    let mut config = BuilderConfig::default();
    if let Some(l) = opt.length { config.agent_length = l; }
    if let Some(m) = opt.margin { config.clearing_margin = m; }

    let eval = evaluate_path(&layout, &path, &config)?;
    let name = |s| names.section_name(s).map(|n| n.to_string()).unwrap_or_else(|| format!("#{}", s));

    println!("# Route path:");
    for (i, leg) in eval.route_path.legs.iter().enumerate() {
        let secs: Vec<String> = leg.iter().map(|e| name(e.section)).collect();
        println!("leg {}: {}", i, secs.join(" "));
        if let Some(r) = eval.route_path.reversals.get(i) {
            println!("  {:?} at {} valid={} diverge_offset={}",
                     r.kind, name(r.reversal_section), r.valid, r.diverge_offset);
        }
    }
    for w in &eval.route_path.waiting_points {
        println!("wait leg {} at {} ({:?})", w.leg, name(w.section), w.duration);
    }
    for a in &eval.route_path.alternative_paths {
        println!("alternative {} leg {} {}..{} useful length {}",
                 a.name, a.leg, name(a.route[0].section), name(a.route[a.route.len() - 1].section),
                 a.useful_length);
    }
    println!("# Trial reservation: {} sections", eval.reserved);
    if opt.verbose >= 1 {
        print!("{}", output::history::describe(&names, &eval.history)?);
    }

    if let Some(ref json) = opt.json {
        use std::fs::File;
        use std::io::BufWriter;
        let file = File::create(json)?;
        let mut writer = BufWriter::new(&file);
        output::json::json_route_path(&names, &eval.route_path, &mut writer)?;
    }

    if let Some(ref snapshot) = opt.snapshot {
        use std::fs::File;
        use std::io::Write;
        let bytes = output::snapshot::write_snapshot(&eval.network, &[eval.route_path.clone()]);
        let mut file = File::create(snapshot)?;
        file.write_all(&bytes)?;
    }

    Ok(())
}

pub fn main() {
    let opt = Opt::from_args();
    init_log(opt.verbose);
    match run(&opt) {
        Ok(()) => {},
        Err(e) => {
            println!("Error:\n{}", e.as_fail());
            if Level::Debug <= log::max_level() {
                println!("{:?}", e);
            }
            std::process::exit(1);
        },
    }
}
