use super::layout::*;
use super::parser_utils::*;
use crate::railway::{Direction, Location};

use std::collections::HashMap;

// LEXER
//
//
#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Number(f64),
    Identifier(String),
    EOF,
}

pub fn lexer(x: &mut dyn Iterator<Item = char>) -> Result<Vec<Token>, LexerError> {
    let mut tokens = Vec::new();
    let mut input = x.peekable();
    let mut line = 1;
    while let Some(&ch) = input.peek() {
        match ch {
            x if x.is_numeric() => {
                let num: String = consume_while(&mut input, |a| {
                        a.is_numeric() || a == 'e' || a == 'E' || a == '.'
                    })
                    .into_iter()
                    .collect();
                let n = num.parse::<f64>().map_err(|_| LexerError::Number(line, num.clone()))?;
                tokens.push(Token::Number(n));
            }
            x if x.is_alphabetic() => {
                let s: String = consume_while(&mut input, |a| a == '_' || a == '.' || a.is_alphanumeric())
                    .into_iter()
                    .collect();
                tokens.push(Token::Identifier(s));
            }
            '%' => {
                consume_while(&mut input, |a| a != '\n');
            }
            ' ' | '\r' | '\t' => {
                input.next();
            }
            '\n' => {
                input.next();
                line += 1;
            }
            c => {
                return Err(LexerError::UnexpectedChar {
                    i: line,
                    c: c.to_string(),
                });
            }
        }
    }
    tokens.push(Token::EOF);
    Ok(tokens)
}

// PARSER
//
//
#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Section { name: String, kind: CircuitType, length: f64, overlap: f64, switch: Option<usize> },
    Link { from: Slot, to: Slot },
    Signal { name: String, at: Slot, offset: f64 },
    SpeedPost { name: String, at: Slot, offset: f64 },
    MilePost { name: String, section: String, offset: f64 },
    Span { kind: SpanKind, section: String, start: f64, end: f64 },
    Shape { name: String, overlap: f64 },
    Seam(Slot),
    Crossover { first: Slot, second: Slot, shape: Option<String> },
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SpanKind {
    Platform(usize),
    Tunnel,
    Trough,
}

/// A section name with direction and (for pins) location.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub section: String,
    pub direction: Direction,
    pub location: Location,
}

pub fn parse(t: &[Token]) -> Result<Vec<Statement>, ParseError> {
    let mut i = 0;
    let mut stmts = Vec::new();
    while t.get(i) != Some(&Token::EOF) {
        if i >= t.len() {
            return Err(ParseError::UnexpectedEOF);
        }
        stmts.push(parse_statement(&mut i, t)?);
    }
    Ok(stmts)
}

pub fn identifier(i: &mut usize, tokens: &[Token]) -> Result<String, ParseError> {
    let r = match tokens.get(*i) {
        Some(Token::Identifier(ref s)) => s.clone(),
        Some(x) => return Err(ParseError::UnexpectedToken(*i, format!("{:?}", x))),
        None => return Err(ParseError::UnexpectedEOF),
    };
    *i += 1;
    Ok(r)
}

pub fn number(i: &mut usize, tokens: &[Token]) -> Result<f64, ParseError> {
    let r = match tokens.get(*i) {
        Some(&Token::Number(x)) => x,
        Some(x) => return Err(ParseError::UnexpectedToken(*i, format!("{:?}", x))),
        None => return Err(ParseError::UnexpectedEOF),
    };
    *i += 1;
    Ok(r)
}

pub fn symbol(i: &mut usize, t: &[Token], s: &str) -> Result<(), ParseError> {
    let at = *i;
    if identifier(i, t)? != s {
        Err(ParseError::UnexpectedToken(at, format!("expected {:?}", s)))
    } else {
        Ok(())
    }
}

fn keyword(i: &mut usize, t: &[Token], s: &str) -> bool {
    matches(i, t, Token::Identifier(s.to_string()))
}

fn direction(i: &mut usize, t: &[Token]) -> Result<Direction, ParseError> {
    alt(i, t, &[&|i, t| { symbol(i, t, "ahead")?; Ok(Direction::Ahead) },
                &|i, t| { symbol(i, t, "reverse")?; Ok(Direction::Reverse) }])
}

fn location(i: &mut usize, t: &[Token]) -> Result<Location, ParseError> {
    alt(i, t, &[&|i, t| { symbol(i, t, "near")?; Ok(Location::Near) },
                &|i, t| { symbol(i, t, "far")?; Ok(Location::Far) }])
}

fn circuit_type(i: &mut usize, t: &[Token]) -> Result<CircuitType, ParseError> {
    let at = *i;
    match identifier(i, t)?.as_str() {
        "normal" => Ok(CircuitType::Normal),
        "junction" => Ok(CircuitType::Junction),
        "crossover" => Ok(CircuitType::Crossover),
        "end" => Ok(CircuitType::EndOfTrack),
        "empty" => Ok(CircuitType::Empty),
        x => Err(ParseError::UnexpectedToken(at, x.to_string())),
    }
}

fn pin_slot(i: &mut usize, t: &[Token]) -> Result<Slot, ParseError> {
    let section = identifier(i, t)?;
    let direction = direction(i, t)?;
    let location = location(i, t)?;
    Ok(Slot { section, direction, location })
}

fn item_slot(i: &mut usize, t: &[Token]) -> Result<(Slot, f64), ParseError> {
    symbol(i, t, "at")?;
    let section = identifier(i, t)?;
    let direction = direction(i, t)?;
    let offset = number(i, t)?;
    Ok((Slot { section, direction, location: Location::Near }, offset))
}

fn span(i: &mut usize, t: &[Token], kind: SpanKind) -> Result<Statement, ParseError> {
    symbol(i, t, "at")?;
    let section = identifier(i, t)?;
    let start = number(i, t)?;
    let end = number(i, t)?;
    Ok(Statement::Span { kind, section, start, end })
}

/// One statement of the layout format:
///
/// * `section s1 normal 250.0 [overlap 10.0] [switch 3]`
/// * `link s1 ahead near to s2 ahead near`
/// * `signal sig1 at s1 ahead 240.0`
/// * `speedpost v1 at s1 reverse 10.0`
/// * `milepost km12 at s1 100.0`
/// * `platform 2 at s1 20.0 220.0`, `tunnel at s1 0.0 50.0`, `trough at s1 5.0 15.0`
/// * `shape x1 overlap 12.5`
/// * `seam s1 ahead near`
/// * `crossover s1 ahead near and s3 ahead near [shape x1]`
pub fn parse_statement(i: &mut usize, t: &[Token]) -> Result<Statement, ParseError> {
    let at = *i;
    let head = identifier(i, t)?;
    match head.as_str() {
        "section" => {
            let name = identifier(i, t)?;
            let kind = circuit_type(i, t)?;
            let length = number(i, t)?;
            let mut overlap = 0.0;
            let mut switch = None;
            loop {
                if keyword(i, t, "overlap") {
                    overlap = number(i, t)?;
                } else if keyword(i, t, "switch") {
                    switch = Some(number(i, t)? as usize);
                } else {
                    break;
                }
            }
            Ok(Statement::Section { name, kind, length, overlap, switch })
        }
        "link" => {
            let from = pin_slot(i, t)?;
            symbol(i, t, "to")?;
            let to = pin_slot(i, t)?;
            Ok(Statement::Link { from, to })
        }
        "signal" => {
            let name = identifier(i, t)?;
            let (at, offset) = item_slot(i, t)?;
            Ok(Statement::Signal { name, at, offset })
        }
        "speedpost" => {
            let name = identifier(i, t)?;
            let (at, offset) = item_slot(i, t)?;
            Ok(Statement::SpeedPost { name, at, offset })
        }
        "milepost" => {
            let name = identifier(i, t)?;
            symbol(i, t, "at")?;
            let section = identifier(i, t)?;
            let offset = number(i, t)?;
            Ok(Statement::MilePost { name, section, offset })
        }
        "platform" => {
            let id = number(i, t)? as usize;
            span(i, t, SpanKind::Platform(id))
        }
        "tunnel" => span(i, t, SpanKind::Tunnel),
        "trough" => span(i, t, SpanKind::Trough),
        "shape" => {
            let name = identifier(i, t)?;
            symbol(i, t, "overlap")?;
            let overlap = number(i, t)?;
            Ok(Statement::Shape { name, overlap })
        }
        "seam" => Ok(Statement::Seam(pin_slot(i, t)?)),
        "crossover" => {
            let first = pin_slot(i, t)?;
            symbol(i, t, "and")?;
            let second = pin_slot(i, t)?;
            let shape = if keyword(i, t, "shape") { Some(identifier(i, t)?) } else { None };
            Ok(Statement::Crossover { first, second, shape })
        }
        x => Err(ParseError::UnexpectedToken(at, x.to_string())),
    }
}

// MODEL
//
//
#[derive(Debug, Clone, Fail)]
pub enum ModelError {
    #[fail(display = "section defined twice: {}", _0)]
    DuplicateSection(String),
    #[fail(display = "name defined twice: {}", _0)]
    DuplicateName(String),
    #[fail(display = "unknown section: {}", _0)]
    UnknownSection(String),
    #[fail(display = "unknown crossover shape: {}", _0)]
    UnknownShape(String),
}

fn lookup(names: &HashMap<String, usize>, name: &str) -> Result<usize, ModelError> {
    names.get(name).cloned().ok_or_else(|| ModelError::UnknownSection(name.to_string()))
}

fn new_name(names: &mut HashMap<String, usize>, name: &str) -> Result<usize, ModelError> {
    if names.contains_key(name) {
        return Err(ModelError::DuplicateName(name.to_string()));
    }
    let id = names.len();
    names.insert(name.to_string(), id);
    Ok(id)
}

pub fn model_from_ast(stmts: &[Statement]) -> Result<(TrackLayout, LayoutNames<String>), ModelError> {
    let mut layout = TrackLayout::default();
    let mut names: LayoutNames<String> = Default::default();

    // Sections first, so that every other statement may refer to any section.
    for s in stmts {
        if let Statement::Section { ref name, kind, length, overlap, switch } = *s {
            if names.section_names.contains_key(name) {
                return Err(ModelError::DuplicateSection(name.clone()));
            }
            names.section_names.insert(name.clone(), layout.sections.len());
            layout.sections.push(SectionSpec { kind, length, overlap, switch });
        }
    }
    for s in stmts {
        if let Statement::Shape { ref name, overlap } = *s {
            new_name(&mut names.shape_names, name)?;
            layout.shapes.push(CrossoverShape { overlap: Some(overlap) });
        }
    }

    let sections = &names.section_names;
    let pin = |s: &Slot| -> Result<PinRef, ModelError> {
        Ok(PinRef { section: lookup(sections, &s.section)?, direction: s.direction, location: s.location })
    };

    let mut signal_names = HashMap::new();
    let mut item_names = HashMap::new();
    for s in stmts {
        match *s {
            Statement::Section { .. } | Statement::Shape { .. } => {}
            Statement::Link { ref from, ref to } => {
                layout.links.push(Link { from: pin(from)?, to: pin(to)? });
            }
            Statement::Signal { ref name, ref at, offset } => {
                let id = new_name(&mut signal_names, name)?;
                layout.items.push(ItemSpec { section: pin(at)?.section, item: TrackItem {
                    kind: ItemKind::Signal(id), direction: Some(at.direction), offset } });
            }
            Statement::SpeedPost { ref name, ref at, offset } => {
                let id = new_name(&mut item_names, name)?;
                layout.items.push(ItemSpec { section: pin(at)?.section, item: TrackItem {
                    kind: ItemKind::SpeedPost(id), direction: Some(at.direction), offset } });
            }
            Statement::MilePost { ref name, ref section, offset } => {
                let id = new_name(&mut item_names, name)?;
                layout.items.push(ItemSpec { section: lookup(sections, section)?, item: TrackItem {
                    kind: ItemKind::MilePost(id), direction: None, offset } });
            }
            Statement::Span { kind, ref section, start, end } => {
                let kind = match kind {
                    SpanKind::Platform(n) => AnnotationKind::Platform(n),
                    SpanKind::Tunnel => AnnotationKind::Tunnel,
                    SpanKind::Trough => AnnotationKind::Trough,
                };
                layout.annotations.push((lookup(sections, section)?, Annotation { kind, start, end }));
            }
            Statement::Seam(ref slot) => layout.seams.push(pin(slot)?),
            Statement::Crossover { ref first, ref second, ref shape } => {
                let shape = match *shape {
                    Some(ref n) => Some(names.shape_names.get(n).cloned()
                                        .ok_or_else(|| ModelError::UnknownShape(n.clone()))?),
                    None => None,
                };
                layout.crossovers.push(CrossoverSpec { first: pin(first)?, second: pin(second)?, shape });
            }
        }
    }
    names.signal_names = signal_names;
    names.item_names = item_names;

    Ok((layout, names))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: &str = "
        % two lines joined by a junction
        section a normal 100.0
        section j junction 0 overlap 15 switch 1
        section b normal 200.0
        section c normal 150.0
        link a ahead near to j ahead near
        link j ahead near to b ahead near
        link j ahead far to c ahead near
        signal s1 at a ahead 95.0
        speedpost v80 at b reverse 10
        milepost km1 at b 100
        platform 2 at b 20 180
        tunnel at c 0 50
        shape x overlap 12.5
        seam b ahead near
    ";

    fn load(s: &str) -> (TrackLayout, LayoutNames<String>) {
        let lex = lexer(&mut s.chars()).unwrap();
        let stmts = parse(&lex).unwrap();
        model_from_ast(&stmts).unwrap()
    }

    #[test]
    fn parses_sections_links_and_items() {
        let (layout, names) = load(LAYOUT);
        assert_eq!(layout.sections.len(), 4);
        assert_eq!(layout.sections[1].kind, CircuitType::Junction);
        assert_eq!(layout.sections[1].overlap, 15.0);
        assert_eq!(layout.sections[1].switch, Some(1));
        assert_eq!(layout.links.len(), 3);
        assert_eq!(layout.links[2].from, PinRef { section: 1, direction: Direction::Ahead, location: Location::Far });
        assert_eq!(names.signal_names["s1"], 0);
        assert_eq!(layout.items.len(), 3);
        assert_eq!(layout.items[1].item.direction, Some(Direction::Reverse));
        assert_eq!(layout.annotations.len(), 2);
        assert_eq!(layout.shapes[0].overlap, Some(12.5));
        assert_eq!(layout.seams.len(), 1);
        assert_eq!(names.section_name(2), Some("b"));
    }

    #[test]
    fn unknown_names_are_errors() {
        let lex = lexer(&mut "section a normal 1\nlink a ahead near to z ahead near".chars()).unwrap();
        let stmts = parse(&lex).unwrap();
        match model_from_ast(&stmts) {
            Err(ModelError::UnknownSection(ref n)) if n == "z" => {}
            x => panic!("unexpected {:?}", x),
        }
        assert!(parse(&lexer(&mut "section a sideways 1".chars()).unwrap()).is_err());
        assert!(lexer(&mut "section a normal 1 ;".chars()).is_err());
    }
}
