use lazy_static::lazy_static;
use regex::Regex;

use super::SynthesisError;

lazy_static! {
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```[^\n]*\n(.*?)```").unwrap();
    static ref DECLARATION_HEADER: Regex = Regex::new(
        r"\bimpl\s+(?:([A-Za-z_][A-Za-z0-9_]*(?:::[A-Za-z_][A-Za-z0-9_]*)*)\s+for\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*\{"
    )
    .unwrap();
}

/// A tool declaration found in generated text
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDeclaration {
    /// `Weather` in `impl Tool for Weather`
    pub type_name: String,
    /// `Tool` in `impl Tool for Weather`, `None` for an inherent impl
    pub marker: Option<String>,
    /// Script between the outer braces
    pub body: String,
    /// The whole declaration, header included
    pub source: String,
}

impl ToolDeclaration {
    /// Whether the declaration implements `marker`, ignoring any path prefix
    pub fn implements(&self, marker: &str) -> bool {
        self.marker
            .as_deref()
            .and_then(|m| m.rsplit("::").next())
            .is_some_and(|m| m == marker)
    }

    /// Name used when the script does not define `name()`
    pub fn default_tool_name(&self) -> String {
        to_snake_case(&self.type_name)
    }
}

/// Find the first tool declaration in `text`.
///
/// Fenced code blocks are searched first, in order; if none holds a
/// declaration the raw text is scanned.
pub fn extract_declaration(text: &str) -> Result<ToolDeclaration, SynthesisError> {
    for block in FENCED_BLOCK.captures_iter(text) {
        if let Some(found) = block.get(1).and_then(|b| find_declaration(b.as_str())) {
            return found;
        }
    }
    find_declaration(text).unwrap_or(Err(SynthesisError::NoDeclaration))
}

fn find_declaration(text: &str) -> Option<Result<ToolDeclaration, SynthesisError>> {
    let captures = DECLARATION_HEADER.captures(text)?;
    let header = captures.get(0)?;
    let type_name = captures.get(2)?.as_str().to_string();
    let open = header.end() - 1;

    let Some(close) = matching_brace(text, open) else {
        return Some(Err(SynthesisError::Compile {
            name: type_name,
            message: "unbalanced braces in declaration".to_string(),
        }));
    };

    Some(Ok(ToolDeclaration {
        marker: captures.get(1).map(|m| m.as_str().to_string()),
        body: text[open + 1..close].to_string(),
        source: text[header.start()..=close].to_string(),
        type_name,
    }))
}

/// Index of the brace closing the one at `open`, skipping string literals
/// and comments. Works on bytes: every delimiter is ASCII.
fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut i = open;

    while i < bytes.len() {
        match bytes[i] {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            b'"' | b'\'' | b'`' => i = closing_quote(bytes, i)?,
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                i = bytes[i..]
                    .iter()
                    .position(|&b| b == b'\n')
                    .map_or(bytes.len(), |p| i + p);
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = text[i + 2..].find("*/").map(|p| i + 2 + p + 1)?;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn closing_quote(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i),
            _ => i += 1,
        }
    }
    None
}

/// `CurrencyConverter` -> `currency_converter`, `HTTPFetcher` -> `http_fetcher`
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1);
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_fenced_block() {
        let text = "Sure!\n```rhai\nimpl Tool for Weather {\n    fn run(args) { \"sunny\" }\n}\n```\nEnjoy.";
        let decl = extract_declaration(text).unwrap();
        assert_eq!(decl.type_name, "Weather");
        assert_eq!(decl.marker.as_deref(), Some("Tool"));
        assert_eq!(decl.body.trim(), "fn run(args) { \"sunny\" }");
        assert!(decl.source.starts_with("impl Tool for Weather {"));
        assert!(decl.source.ends_with('}'));
    }

    #[test]
    fn test_extract_from_raw_text() {
        let text = "I wrote impl Tool for Clock { fn run(args) { 12 } } for you";
        let decl = extract_declaration(text).unwrap();
        assert_eq!(decl.type_name, "Clock");
        assert_eq!(decl.source, "impl Tool for Clock { fn run(args) { 12 } }");
    }

    #[test]
    fn test_first_declaration_wins() {
        let text = "```\nimpl Tool for First { fn run(args) { 1 } }\n```\n```\nimpl Tool for Second { fn run(args) { 2 } }\n```";
        assert_eq!(extract_declaration(text).unwrap().type_name, "First");

        let text = "impl Tool for A { fn run(args) { 1 } }\nimpl Tool for B { fn run(args) { 2 } }";
        assert_eq!(extract_declaration(text).unwrap().type_name, "A");
    }

    #[test]
    fn test_fence_without_declaration_falls_back_to_raw_text() {
        let text = "```json\n{\"a\": 1}\n```\nimpl Tool for Later { fn run(args) { 1 } }";
        assert_eq!(extract_declaration(text).unwrap().type_name, "Later");
    }

    #[test]
    fn test_braces_in_strings_and_comments_are_skipped() {
        let text = r#"impl Tool for Tricky {
    // a stray } in a comment
    /* and { another } */
    fn run(args) { "}" + '{' + `${args.x}}` }
}"#;
        let decl = extract_declaration(text).unwrap();
        assert_eq!(decl.source, text);
    }

    #[test]
    fn test_unbalanced_declaration() {
        let err = extract_declaration("impl Tool for Broken { fn run(args) { 1 }").unwrap_err();
        assert!(matches!(err, SynthesisError::Compile { ref name, .. } if name == "Broken"));
    }

    #[test]
    fn test_no_declaration() {
        assert_eq!(
            extract_declaration("Result: 42").unwrap_err(),
            SynthesisError::NoDeclaration
        );
    }

    #[test]
    fn test_implements_ignores_path() {
        let decl = extract_declaration("impl toolsmith::Tool for X { }").unwrap();
        assert!(decl.implements("Tool"));
        let decl = extract_declaration("impl X { }").unwrap();
        assert!(!decl.implements("Tool"));
        assert_eq!(decl.marker, None);
    }

    #[test]
    fn test_to_snake_case() {
        assert_eq!(to_snake_case("Weather"), "weather");
        assert_eq!(to_snake_case("CurrencyConverter"), "currency_converter");
        assert_eq!(to_snake_case("HTTPFetcher"), "http_fetcher");
        assert_eq!(to_snake_case("Base64Decoder"), "base64_decoder");
        assert_eq!(to_snake_case("already_snake"), "already_snake");
    }
}
