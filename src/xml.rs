//! Minimal XML helpers for the notebook service responses.
//!
//! The service answers with small, flat documents, so a tag scanner is all
//! that is needed. Tags may carry attributes (`<is-page type="boolean">`) and
//! may be self-closing. Nested elements sharing a name are not supported.

/// Position of the next `<tag ...>` start tag at or after `from`.
/// Returns (start of `<`, end of the start tag after `>`, self-closing).
fn find_start_tag(xml: &str, tag: &str, from: usize) -> Option<(usize, usize, bool)> {
    let needle = format!("<{}", tag);
    let mut search = from;

    while let Some(pos) = xml[search..].find(&needle) {
        let abs = search + pos;
        let after = abs + needle.len();
        match xml[after..].chars().next() {
            Some('>') | Some('/') | Some(' ') | Some('\t') | Some('\n') | Some('\r') => {
                let close = xml[after..].find('>')? + after;
                let self_closing = xml[..close].ends_with('/');
                return Some((abs, close + 1, self_closing));
            }
            // A longer tag sharing the prefix, e.g. <entry-data> when looking for <entry>
            _ => search = after,
        }
    }
    None
}

/// Extract the raw inner text of the first `<tag>` element.
pub fn extract_xml_tag(xml: &str, tag: &str) -> Option<String> {
    extract_from(xml, tag, 0).map(|(inner, _)| inner.to_string())
}

fn extract_from<'a>(xml: &'a str, tag: &str, from: usize) -> Option<(&'a str, usize)> {
    let (_, content_start, self_closing) = find_start_tag(xml, tag, from)?;
    if self_closing {
        return Some(("", content_start));
    }
    let end_tag = format!("</{}>", tag);
    let end = xml[content_start..].find(&end_tag)? + content_start;
    Some((&xml[content_start..end], end + end_tag.len()))
}

/// Extract the raw inner text of every `<tag>` element, in document order.
pub fn extract_all_xml_tags(xml: &str, tag: &str) -> Vec<String> {
    let mut results = Vec::new();
    let mut search_start = 0;

    while let Some((inner, next)) = extract_from(xml, tag, search_start) {
        results.push(inner.to_string());
        search_start = next;
    }

    results
}

/// Extract and unescape the text of the first `<tag>` element.
pub fn extract_text(xml: &str, tag: &str) -> Option<String> {
    extract_xml_tag(xml, tag).map(|t| unescape(t.trim()))
}

/// Name of the document's root element, skipping the prolog and comments.
pub fn root_tag(xml: &str) -> Option<&str> {
    let mut rest = xml;
    loop {
        let open = rest.find('<')?;
        rest = &rest[open..];
        if rest.starts_with("<?") {
            rest = &rest[rest.find("?>")? + 2..];
        } else if rest.starts_with("<!--") {
            rest = &rest[rest.find("-->")? + 3..];
        } else if rest.starts_with("<!") {
            rest = &rest[rest.find('>')? + 1..];
        } else {
            let name_end = rest[1..]
                .find(|c: char| c == '>' || c == '/' || c.is_whitespace())?
                + 1;
            return Some(&rest[1..name_end]);
        }
    }
}

/// Remove every `<tag>...</tag>` section, so lookups on the remaining text
/// only see the outer elements.
pub fn strip_sections(xml: &str, tag: &str) -> String {
    let mut out = String::with_capacity(xml.len());
    let mut cursor = 0;

    while let Some((start, _, _)) = find_start_tag(xml, tag, cursor) {
        out.push_str(&xml[cursor..start]);
        match extract_from(xml, tag, start) {
            Some((_, next)) => cursor = next,
            None => {
                cursor = xml.len();
                break;
            }
        }
    }
    out.push_str(&xml[cursor..]);
    out
}

/// Resolve the predefined entities, numeric character references and CDATA
/// wrappers found in element text.
pub fn unescape(text: &str) -> String {
    let text = match text.strip_prefix("<![CDATA[").and_then(|t| t.strip_suffix("]]>")) {
        Some(inner) => return inner.to_string(),
        None => text,
    };

    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else { break };
        let entity = &rest[1..semi];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|d| d.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_with_attributes() {
        let xml = r#"<node><is-page type="boolean">true</is-page></node>"#;
        assert_eq!(extract_xml_tag(xml, "is-page").as_deref(), Some("true"));
    }

    #[test]
    fn test_prefix_tags_are_not_confused() {
        let xml = "<entry><entry-data>x</entry-data><eid>1</eid></entry>";
        assert_eq!(extract_xml_tag(xml, "entry-data").as_deref(), Some("x"));
        let entries = extract_all_xml_tags(xml, "entry");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].contains("<eid>1</eid>"));
    }

    #[test]
    fn test_self_closing() {
        let xml = "<a><b/><b>two</b></a>";
        assert_eq!(extract_all_xml_tags(xml, "b"), vec!["", "two"]);
    }

    #[test]
    fn test_root_tag_skips_prolog() {
        let xml = "<?xml version=\"1.0\"?>\n<!-- hi -->\n<users>\n<id>1</id></users>";
        assert_eq!(root_tag(xml), Some("users"));
        assert_eq!(root_tag("<error code=\"4\"/>"), Some("error"));
        assert_eq!(root_tag("not xml"), None);
    }

    #[test]
    fn test_strip_sections() {
        let xml = "<users><notebooks><notebook><id>nb</id></notebook></notebooks><id>u1</id></users>";
        let outer = strip_sections(xml, "notebooks");
        assert_eq!(extract_xml_tag(&outer, "id").as_deref(), Some("u1"));
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("{&quot;a&quot;: 1} &amp; &#65;&#x42;"), "{\"a\": 1} & AB");
        assert_eq!(unescape("<![CDATA[<raw> & text]]>"), "<raw> & text");
        assert_eq!(unescape("fish & chips"), "fish & chips");
    }
}
