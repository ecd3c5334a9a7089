use super::layout::LayoutNames;
use crate::railway::builder::{AbstractPath, AlternativeSpec, Waypoint, WaypointKind};
use crate::railway::passing::Authorization;
use crate::railway::{Direction, Location, SectionId};
use regex::Regex;

#[derive(Debug, Fail)]
pub enum ParseError {
    #[fail(display = "error in regular expression: {}", _0)]
    RegexError(String),
    #[fail(display = "error converting number: {}", _0)]
    NumberError(String),
    #[fail(display = "unknown section: {}", _0)]
    UnknownSection(String),
    #[fail(display = "unrecognized path line: {}", _0)]
    Unrecognized(String),
}

fn regex(s: &str) -> Result<Regex, ParseError> {
    Regex::new(s).map_err(|e| ParseError::RegexError(format!("{:?}", e)))
}

fn num(s: &str) -> Result<f64, ParseError> {
    s.parse::<f64>().map_err(|_e| ParseError::NumberError(s.to_string()))
}

fn direction(s: &str) -> Option<Direction> {
    match s {
        "ahead" => Some(Direction::Ahead),
        "reverse" => Some(Direction::Reverse),
        _ => None,
    }
}

fn location(s: &str) -> Option<Location> {
    match s {
        "near" => Some(Location::Near),
        "far" => Some(Location::Far),
        _ => None,
    }
}

/// Parses the waypoint path format, one item per line:
///
/// * start s1 ahead [at 20.0]
/// * via s4 [ahead|reverse]
/// * junction j2 far
/// * reverse s9 [at 120.0]
/// * wait s5 30.0 [at 80.0]
/// * stop s5 [at 80.0]
/// * end s12 [ahead|reverse]
/// * alternative loop1 from j2 to j5 [choose j2 far] [for public|7 ...]
///
/// Empty lines and lines starting with `#` are skipped.
pub fn parse_path(input: &str, names: &LayoutNames<String>) -> Result<AbstractPath, ParseError> {
    let section = |s: &str| -> Result<SectionId, ParseError> {
        names.section_names.get(s).cloned().ok_or_else(|| ParseError::UnknownSection(s.to_string()))
    };

    let skip_re = regex(r"^\s*(#.*)?$")?;
    let point_re = regex(r"(?x) ^ \s* (?P<kind>start|via|reverse|stop|end) \s+ (?P<sec>[\w\.]+)
            (?: \s+ (?P<dir>ahead|reverse) )?
            (?: \s+ at \s+ (?P<at>[\d\.]+) )? \s* $")?;
    let junction_re = regex(r"^\s*junction\s+(?P<sec>[\w\.]+)\s+(?P<loc>near|far)\s*$")?;
    let wait_re = regex(r"(?x) ^ \s* wait \s+ (?P<sec>[\w\.]+) \s+ (?P<t>[\d\.]+)
            (?: \s+ at \s+ (?P<at>[\d\.]+) )? \s* $")?;
    let alt_re = regex(r"(?x) ^ \s* alternative \s+ (?P<name>[\w\.]+) \s+
            from \s+ (?P<from>[\w\.]+) \s+ to \s+ (?P<to>[\w\.]+) (?P<rest>.*) $")?;
    let choose_re = regex(r"choose\s+(?P<sec>[\w\.]+)\s+(?P<loc>near|far)")?;
    let for_re = regex(r"for\s+(?P<who>(?:public|\d+)(?:\s+(?:public|\d+))*)")?;

    let mut path = AbstractPath::default();
    for line in input.lines() {
        if skip_re.is_match(line) {
            continue;
        }
        if let Some(g) = point_re.captures(line) {
            let kind = match &g["kind"] {
                "start" => WaypointKind::Start,
                "via" => WaypointKind::Via,
                "reverse" => WaypointKind::Reversal,
                "stop" => WaypointKind::Stop,
                _ => WaypointKind::End,
            };
            let offset = match g.name("at") {
                Some(m) => Some(num(m.as_str())?),
                None => None,
            };
            path.waypoints.push(Waypoint {
                section: section(&g["sec"])?,
                direction: g.name("dir").and_then(|m| direction(m.as_str())),
                offset,
                kind,
            });
            continue;
        }
        if let Some(g) = junction_re.captures(line) {
            let loc = location(&g["loc"]).unwrap_or(Location::Near);
            path.waypoints.push(Waypoint {
                section: section(&g["sec"])?,
                direction: None,
                offset: None,
                kind: WaypointKind::Junction(loc),
            });
            continue;
        }
        if let Some(g) = wait_re.captures(line) {
            let offset = match g.name("at") {
                Some(m) => Some(num(m.as_str())?),
                None => None,
            };
            path.waypoints.push(Waypoint {
                section: section(&g["sec"])?,
                direction: None,
                offset,
                kind: WaypointKind::Wait(num(&g["t"])?),
            });
            continue;
        }
        if let Some(g) = alt_re.captures(line) {
            let rest = &g["rest"];
            let mut choices = Vec::new();
            for c in choose_re.captures_iter(rest) {
                choices.push((section(&c["sec"])?, location(&c["loc"]).unwrap_or(Location::Near)));
            }
            let mut authorization = Vec::new();
            for f in for_re.captures_iter(rest) {
                for who in f["who"].split_whitespace() {
                    authorization.push(if who == "public" {
                        Authorization::Public
                    } else {
                        Authorization::Agent(who.parse::<usize>()
                                             .map_err(|_e| ParseError::NumberError(who.to_string()))?)
                    });
                }
            }
            if authorization.is_empty() {
                authorization.push(Authorization::Public);
            }
            path.alternatives.push(AlternativeSpec {
                name: g["name"].to_string(),
                from: section(&g["from"])?,
                to: section(&g["to"])?,
                choices,
                authorization,
            });
            continue;
        }
        return Err(ParseError::Unrecognized(line.to_string()));
    }

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> LayoutNames<String> {
        let mut n = LayoutNames::default();
        for (i, s) in ["a", "j", "b", "c"].iter().enumerate() {
            n.section_names.insert(s.to_string(), i);
        }
        n
    }

    #[test]
    fn parses_every_line_kind() {
        let input = "
            # outbound
            start a ahead at 20.0
            junction j far
            wait c 30 at 80
            reverse c
            stop a
            end a reverse
            alternative loop1 from j to b choose j far for 7 public
        ";
        let p = parse_path(input, &names()).unwrap();
        assert_eq!(p.waypoints.len(), 6);
        assert_eq!(p.waypoints[0], Waypoint { section: 0, direction: Some(Direction::Ahead), offset: Some(20.0),
                                              kind: WaypointKind::Start });
        assert_eq!(p.waypoints[1].kind, WaypointKind::Junction(Location::Far));
        assert_eq!(p.waypoints[2].kind, WaypointKind::Wait(30.0));
        assert_eq!(p.waypoints[2].offset, Some(80.0));
        assert_eq!(p.waypoints[3].kind, WaypointKind::Reversal);
        assert_eq!(p.waypoints[5].direction, Some(Direction::Reverse));
        assert_eq!(p.alternatives[0].choices, vec![(1, Location::Far)]);
        assert_eq!(p.alternatives[0].authorization, vec![Authorization::Agent(7), Authorization::Public]);
    }

    #[test]
    fn rejects_unknown_lines_and_sections() {
        match parse_path("start q ahead", &names()) {
            Err(ParseError::UnknownSection(ref s)) if s == "q" => {}
            x => panic!("unexpected {:?}", x),
        }
        match parse_path("drive a", &names()) {
            Err(ParseError::Unrecognized(_)) => {}
            x => panic!("unexpected {:?}", x),
        }
        let p = parse_path("alternative x from a to b", &names()).unwrap();
        assert_eq!(p.alternatives[0].authorization, vec![Authorization::Public]);
    }
}
