use crate::binder::{self, BoundExpression};
use crate::error::Result;
use crate::scope::Scope;

pub const OPEN: &str = "{{";
pub const CLOSE: &str = "}}";

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    Dynamic(BoundExpression),
}

/// Splits `text` on `{{ expr }}` markers.
///
/// The result always starts and ends with a literal (possibly empty) and
/// alternates literal, dynamic, literal. The first `}}` after a `{{` closes it;
/// a `{{` with no closing marker stays literal text.
pub fn parse(text: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = text;
    while let Some(open) = rest.find(OPEN) {
        let inner = &rest[open + OPEN.len()..];
        let Some(close) = inner.find(CLOSE) else {
            break;
        };
        literal.push_str(&rest[..open]);
        segments.push(Segment::Literal(std::mem::take(&mut literal)));
        segments.push(Segment::Dynamic(binder::bind(&inner[..close])?));
        rest = &inner[close + CLOSE.len()..];
    }
    literal.push_str(rest);
    segments.push(Segment::Literal(literal));
    Ok(segments)
}

pub fn has_markers(text: &str) -> bool {
    text.find(OPEN)
        .is_some_and(|open| text[open + OPEN.len()..].contains(CLOSE))
}

/// Concatenates every segment evaluated against `scope`.
pub fn render(segments: &[Segment], scope: &Scope) -> Result<String> {
    let mut output = String::new();
    for segment in segments {
        match segment {
            Segment::Literal(text) => output.push_str(text),
            Segment::Dynamic(expression) => {
                output.push_str(&expression.evaluate(scope)?.to_string())
            }
        }
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;

    fn literal(text: &str) -> Segment {
        Segment::Literal(text.to_owned())
    }

    #[test]
    fn plain_text_is_one_literal() {
        assert_eq!(parse("hello").unwrap(), vec![literal("hello")]);
        assert_eq!(parse("").unwrap(), vec![literal("")]);
    }

    #[test]
    fn segments_alternate_starting_and_ending_with_literals() {
        let segments = parse("{{a}}{{b}}").unwrap();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0], literal(""));
        assert_eq!(segments[2], literal(""));
        assert_eq!(segments[4], literal(""));
        assert!(matches!(segments[1], Segment::Dynamic(_)));
        assert!(matches!(segments[3], Segment::Dynamic(_)));
    }

    #[test]
    fn first_closing_marker_wins() {
        let segments = parse("{{ 'a' }} }}").unwrap();
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[2], literal(" }}"));
    }

    #[test]
    fn unterminated_marker_stays_literal() {
        assert_eq!(parse("a {{ b").unwrap(), vec![literal("a {{ b")]);
        assert!(!has_markers("a {{ b"));
        assert!(has_markers("a {{ b }}"));
    }

    #[test]
    fn renders_against_a_scope() {
        let runtime = Runtime::default();
        let scope = Scope::root(&runtime);
        let segments = parse("a {{1+1}} b").unwrap();
        assert_eq!(render(&segments, &scope).unwrap(), "a 2 b");
    }
}
