//! CSS and XPath fragment extraction

use scraper::{Html, Selector};

/// A parsed selector expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorSpec {
    Css(String),
    Xpath(String),
}

impl SelectorSpec {
    /// Parse a selector string. `css:` and `xpath:` prefixes disambiguate;
    /// unprefixed selectors are treated as CSS.
    pub fn parse(raw: &str) -> Self {
        if let Some(expr) = raw.strip_prefix("xpath:") {
            SelectorSpec::Xpath(expr.trim().to_string())
        } else if let Some(expr) = raw.strip_prefix("css:") {
            SelectorSpec::Css(expr.trim().to_string())
        } else {
            SelectorSpec::Css(raw.trim().to_string())
        }
    }
}

/// Result of applying a selector to a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// The selected fragment
    Fragment(String),
    /// The selector matched nothing
    NoMatch,
    /// The selector could not be parsed or evaluated
    Failed(String),
}

/// Extract the fragment a selector points at.
///
/// Callers treat `NoMatch` and `Failed` as a fallback to the unmodified
/// document; neither aborts a fetch.
pub fn extract(spec: &SelectorSpec, document: &str) -> Extraction {
    match spec {
        SelectorSpec::Css(expr) => extract_css(expr, document),
        SelectorSpec::Xpath(expr) => extract_xpath(expr, document),
    }
}

/// First matching element's inner markup, falling back to its text content
fn extract_css(expr: &str, document: &str) -> Extraction {
    let selector = match Selector::parse(expr) {
        Ok(selector) => selector,
        Err(e) => return Extraction::Failed(format!("invalid CSS selector {:?}: {}", expr, e)),
    };

    let html = Html::parse_document(document);
    match html.select(&selector).next() {
        Some(element) => {
            let inner = element.inner_html();
            if !inner.trim().is_empty() {
                return Extraction::Fragment(inner);
            }
            let text = element.text().collect::<Vec<_>>().join(" ").trim().to_string();
            Extraction::Fragment(text)
        }
        None => Extraction::NoMatch,
    }
}

/// First matching node's string value. XPath evaluation needs well-formed
/// XML; HTML that fails to parse takes the non-fatal `Failed` fallback.
fn extract_xpath(expr: &str, document: &str) -> Extraction {
    let package = match sxd_document::parser::parse(document) {
        Ok(package) => package,
        Err(e) => {
            return Extraction::Failed(format!("document is not well-formed XML: {}", e));
        }
    };
    let doc = package.as_document();

    match sxd_xpath::evaluate_xpath(&doc, expr) {
        Ok(sxd_xpath::Value::Nodeset(nodes)) => match nodes.document_order_first() {
            Some(node) => Extraction::Fragment(node.string_value()),
            None => Extraction::NoMatch,
        },
        Ok(value) => Extraction::Fragment(value.string()),
        Err(e) => Extraction::Failed(format!("invalid XPath {:?}: {}", expr, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML_DOC: &str = r#"
        <html>
            <body>
                <div id="main"><p>Hello <b>world</b></p></div>
                <span class="plain">just text</span>
            </body>
        </html>
    "#;

    const XML_DOC: &str = r#"<feed><entry><title>First</title></entry><entry><title>Second</title></entry></feed>"#;

    #[test]
    fn parse_recognizes_prefixes() {
        assert_eq!(
            SelectorSpec::parse("css:#main"),
            SelectorSpec::Css("#main".to_string())
        );
        assert_eq!(
            SelectorSpec::parse("xpath://entry/title"),
            SelectorSpec::Xpath("//entry/title".to_string())
        );
        assert_eq!(
            SelectorSpec::parse(".content"),
            SelectorSpec::Css(".content".to_string())
        );
    }

    #[test]
    fn css_takes_first_match_inner_markup() {
        let spec = SelectorSpec::parse("css:#main");
        match extract(&spec, HTML_DOC) {
            Extraction::Fragment(fragment) => {
                assert_eq!(fragment, "<p>Hello <b>world</b></p>");
            }
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn css_nested_text_only_element() {
        let spec = SelectorSpec::parse("css:.plain");
        match extract(&spec, HTML_DOC) {
            Extraction::Fragment(fragment) => assert_eq!(fragment, "just text"),
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn css_no_match_reports_no_match() {
        let spec = SelectorSpec::parse("css:#absent");
        assert_eq!(extract(&spec, HTML_DOC), Extraction::NoMatch);
    }

    #[test]
    fn css_invalid_selector_fails_without_panicking() {
        let spec = SelectorSpec::parse("css:{{{");
        match extract(&spec, HTML_DOC) {
            Extraction::Failed(reason) => assert!(reason.contains("invalid CSS selector")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn xpath_takes_first_node_text() {
        let spec = SelectorSpec::parse("xpath://entry/title");
        match extract(&spec, XML_DOC) {
            Extraction::Fragment(fragment) => assert_eq!(fragment, "First"),
            other => panic!("expected fragment, got {other:?}"),
        }
    }

    #[test]
    fn xpath_no_match_reports_no_match() {
        let spec = SelectorSpec::parse("xpath://missing");
        assert_eq!(extract(&spec, XML_DOC), Extraction::NoMatch);
    }

    #[test]
    fn xpath_on_malformed_document_fails_gracefully() {
        let spec = SelectorSpec::parse("xpath://entry");
        match extract(&spec, "<html><p>unclosed") {
            Extraction::Failed(reason) => assert!(reason.contains("not well-formed")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn xpath_scalar_results_are_stringified() {
        let spec = SelectorSpec::parse("xpath:count(//entry)");
        match extract(&spec, XML_DOC) {
            Extraction::Fragment(fragment) => assert_eq!(fragment, "2"),
            other => panic!("expected fragment, got {other:?}"),
        }
    }
}
