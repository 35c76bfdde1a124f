//! Markup reader producing a [`Node`] document.
//!
//! Covers what templates need: elements, quoted/unquoted/bare attributes,
//! void and self-closing tags, raw-text elements, comments, doctype and the
//! basic character entities. No implied end tags or other browser recovery.

use super::{Node, VOID_ELEMENTS};
use crate::error::{Error, Result};
use chumsky::prelude::*;

pub const DEFAULT_RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "effect"];

type ParseError<'src> = Rich<'src, char>;

#[derive(Debug, Clone, PartialEq)]
pub enum Markup {
    Element {
        name: String,
        attributes: Vec<(String, String)>,
        children: Vec<Markup>,
    },
    Text(String),
    Comment(String),
    Doctype(String),
}

impl Markup {
    pub fn into_node(self) -> Node {
        match self {
            Self::Element {
                name,
                attributes,
                children,
            } => {
                let element = Node::element(&name);
                for (attribute, value) in attributes {
                    element.set_attribute(&attribute, value);
                }
                element.append_all(children.into_iter().map(Markup::into_node));
                element
            }
            Self::Text(text) => Node::text(text),
            Self::Comment(text) => Node::comment(text),
            Self::Doctype(text) => Node::doctype(text),
        }
    }
}

/// Parses a whole document with the default raw-text elements.
pub fn parse(source: &str) -> Result<Node> {
    let raw_text_elements: Vec<String> = DEFAULT_RAW_TEXT_ELEMENTS
        .iter()
        .map(|name| (*name).to_owned())
        .collect();
    parse_with(source, &raw_text_elements)
}

/// Parses a whole document. Content of `raw_text_elements` is kept verbatim
/// up to the first `</`.
pub fn parse_with(source: &str, raw_text_elements: &[String]) -> Result<Node> {
    let markup = parser(raw_text_elements.to_vec())
        .parse(source)
        .into_result()
        .map_err(|errors| match errors.into_iter().next() {
            Some(error) => Error::Markup {
                message: error.to_string(),
                span: error.span().into_range(),
            },
            None => Error::Markup {
                message: "invalid markup".to_owned(),
                span: 0..source.len(),
            },
        })?;
    let document = Node::document();
    document.append_all(markup.into_iter().map(Markup::into_node));
    Ok(document)
}

pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{a0}")
        .replace("&amp;", "&")
}

fn is_name_char(character: &char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '-' | '_' | ':' | '.')
}

fn is_attribute_name_char(character: &char) -> bool {
    !character.is_whitespace() && !matches!(character, '=' | '>' | '/' | '"' | '\'' | '<')
}

pub fn parser<'src>(
    raw_text_elements: Vec<String>,
) -> impl Parser<'src, &'src str, Vec<Markup>, extra::Err<ParseError<'src>>> {
    let tag_name = any()
        .filter(char::is_ascii_alphabetic)
        .then(any().filter(is_name_char).repeated())
        .to_slice()
        .map(|name: &str| name.to_ascii_lowercase());

    let attribute_value = just('=').padded().ignore_then(choice((
        none_of('"')
            .repeated()
            .to_slice()
            .delimited_by(just('"'), just('"')),
        none_of('\'')
            .repeated()
            .to_slice()
            .delimited_by(just('\''), just('\'')),
        none_of(" \t\r\n>\"'=<`").repeated().at_least(1).to_slice(),
    )));

    let attribute = any()
        .filter(is_attribute_name_char)
        .repeated()
        .at_least(1)
        .to_slice()
        .then(attribute_value.or_not())
        .map(|(name, value): (&str, Option<&str>)| {
            (
                name.to_owned(),
                value.map(decode_entities).unwrap_or_default(),
            )
        });

    let start_tag = just('<')
        .ignore_then(tag_name)
        .then(
            text::whitespace()
                .at_least(1)
                .ignore_then(
                    attribute
                        .separated_by(text::whitespace().at_least(1))
                        .allow_trailing()
                        .collect::<Vec<_>>(),
                )
                .or_not()
                .map(Option::unwrap_or_default),
        )
        .then_ignore(text::whitespace());

    let end_tag = just("</")
        .ignore_then(tag_name)
        .then_ignore(text::whitespace())
        .then_ignore(just('>'));

    let comment = just("<!--")
        .ignore_then(any().and_is(just("-->").not()).repeated().to_slice())
        .then_ignore(just("-->"))
        .map(|text: &str| Markup::Comment(text.to_owned()));

    let doctype = just("<!")
        .ignore_then(none_of('>').repeated().to_slice())
        .then_ignore(just('>'))
        .map(|text: &str| Markup::Doctype(text.to_owned()));

    let text = choice((
        none_of('<').ignored(),
        just('<')
            .then(
                any()
                    .filter(|character: &char| {
                        character.is_ascii_alphabetic() || matches!(character, '/' | '!')
                    })
                    .not(),
            )
            .ignored(),
    ))
    .repeated()
    .at_least(1)
    .to_slice()
    .map(|text: &str| Markup::Text(decode_entities(text)));

    recursive(move |node| {
        let void_element = start_tag
            .clone()
            .filter(|(name, _): &(String, Vec<(String, String)>)| {
                VOID_ELEMENTS.contains(&name.as_str())
            })
            .then_ignore(just('/').or_not())
            .then_ignore(just('>'))
            .map(|(name, attributes)| Markup::Element {
                name,
                attributes,
                children: Vec::new(),
            });

        let self_closing = start_tag
            .clone()
            .then_ignore(just("/>"))
            .map(|(name, attributes)| Markup::Element {
                name,
                attributes,
                children: Vec::new(),
            });

        let raw_text_element = start_tag
            .clone()
            .filter(move |(name, _): &(String, Vec<(String, String)>)| {
                raw_text_elements.contains(name)
            })
            .then_ignore(just('>'))
            .then(any().and_is(just("</").not()).repeated().to_slice())
            .then(end_tag.clone())
            .validate(|(((name, attributes), body), close), extra, emitter| {
                if name != close {
                    emitter.emit(Rich::custom(
                        extra.span(),
                        format!("expected </{name}>, found </{close}>"),
                    ));
                }
                Markup::Element {
                    name,
                    attributes,
                    children: match body {
                        "" => Vec::new(),
                        body => vec![Markup::Text(body.to_owned())],
                    },
                }
            });

        let element = start_tag
            .clone()
            .then_ignore(just('>'))
            .then(node.repeated().collect::<Vec<_>>())
            .then(end_tag.clone())
            .validate(|(((name, attributes), children), close), extra, emitter| {
                if name != close {
                    emitter.emit(Rich::custom(
                        extra.span(),
                        format!("expected </{name}>, found </{close}>"),
                    ));
                }
                Markup::Element {
                    name,
                    attributes,
                    children,
                }
            });

        choice((
            comment,
            doctype,
            void_element,
            self_closing,
            raw_text_element,
            element,
            text,
        ))
    })
    .repeated()
    .collect::<Vec<_>>()
    .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elements_attributes_and_text() {
        let document =
            parse(r#"<div wisp-root id='app'><p :class="kind" @click=go>Hi {{ name }}</p></div>"#)
                .unwrap();
        let root = document.find_by_id("app").unwrap();
        assert!(root.has_attribute("wisp-root"));
        assert_eq!(root.attribute("wisp-root").as_deref(), Some(""));
        let paragraph = &root.children()[0];
        assert_eq!(
            paragraph.attributes(),
            vec![
                (":class".to_owned(), "kind".to_owned()),
                ("@click".to_owned(), "go".to_owned()),
            ]
        );
        assert_eq!(paragraph.text_content(), "Hi {{ name }}");
    }

    #[test]
    fn void_and_self_closing_elements() {
        let document = parse("<p>a<br>b<img src=x.png/><slot #footer /></p>").unwrap();
        let paragraph = &document.children()[0];
        let names: Vec<_> = paragraph
            .children()
            .iter()
            .map(|child| child.tag_name().map(str::to_owned))
            .collect();
        assert_eq!(
            names,
            vec![
                None,
                Some("br".to_owned()),
                None,
                Some("img".to_owned()),
                Some("slot".to_owned()),
            ]
        );
        assert!(paragraph.children()[4].has_attribute("#footer"));
    }

    #[test]
    fn raw_text_elements_keep_their_content() {
        let document = parse("<effect>count > 1 && log(\"<b>\")</effect>").unwrap();
        let effect = &document.children()[0];
        assert_eq!(effect.text_content(), "count > 1 && log(\"<b>\")");
    }

    #[test]
    fn comments_doctype_and_entities() {
        let document = parse("<!DOCTYPE html><!-- note --><p>a &amp; b &lt; c</p>").unwrap();
        assert_eq!(document.children().len(), 3);
        assert_eq!(document.children()[2].text_content(), "a & b < c");
        assert_eq!(
            document.to_html(),
            "<!DOCTYPE html><!-- note --><p>a &amp; b &lt; c</p>"
        );
    }

    #[test]
    fn less_than_in_text() {
        let document = parse("<p>1 < 2</p>").unwrap();
        assert_eq!(document.text_content(), "1 < 2");
    }

    #[test]
    fn mismatched_close_tag_is_an_error() {
        let error = parse("<div><p></div>").unwrap_err();
        assert!(matches!(error, Error::Markup { .. }));
    }

    #[test]
    fn tag_names_are_lower_cased() {
        let document = parse("<IF :condition=\"x\"></If>").unwrap();
        assert_eq!(document.children()[0].tag_name(), Some("if"));
    }
}
