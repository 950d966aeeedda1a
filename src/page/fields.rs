use scraper::{ElementRef, Html, Selector};

#[derive(Debug, Clone)]
enum Strategy {
    Text(Selector),
    Attr(Selector, &'static str),
}

/// Ordered list of ways to read one field; the first non-empty result wins.
///
/// Selectors that fail to parse are dropped at construction, so a bad
/// fallback never takes the good ones down with it.
#[derive(Debug, Clone, Default)]
pub struct FieldExtractor {
    strategies: Vec<Strategy>,
}

impl FieldExtractor {
    pub fn text(selectors: &[&str]) -> Self {
        Self::default().or_text(selectors)
    }

    pub fn or_text(mut self, selectors: &[&str]) -> Self {
        self.strategies.extend(
            selectors
                .iter()
                .filter_map(|raw| Selector::parse(raw).ok())
                .map(Strategy::Text),
        );
        self
    }

    pub fn or_attr(mut self, selector: &str, attr: &'static str) -> Self {
        if let Ok(parsed) = Selector::parse(selector) {
            self.strategies.push(Strategy::Attr(parsed, attr));
        }
        self
    }

    pub fn extract(&self, scope: ElementRef<'_>) -> Option<String> {
        self.strategies.iter().find_map(|strategy| match strategy {
            Strategy::Text(selector) => scope
                .select(selector)
                .map(|el| collapse_whitespace(&el.text().collect::<String>()))
                .find(|text| !text.is_empty()),
            Strategy::Attr(selector, attr) => scope
                .select(selector)
                .filter_map(|el| el.value().attr(attr))
                .map(collapse_whitespace)
                .find(|text| !text.is_empty()),
        })
    }

    pub fn extract_document(&self, document: &Html) -> Option<String> {
        self.extract(document.root_element())
    }
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First element in `scope` matched by any of `selectors`, in list order.
pub fn select_first<'a>(scope: ElementRef<'a>, selectors: &[&str]) -> Option<ElementRef<'a>> {
    selectors
        .iter()
        .filter_map(|raw| Selector::parse(raw).ok())
        .find_map(|selector| scope.select(&selector).next())
}

/// All elements matched by the first selector in `selectors` that matches
/// anything at all.
pub fn select_all<'a>(scope: ElementRef<'a>, selectors: &[&str]) -> Vec<ElementRef<'a>> {
    selectors
        .iter()
        .filter_map(|raw| Selector::parse(raw).ok())
        .map(|selector| scope.select(&selector).collect::<Vec<_>>())
        .find(|rows| !rows.is_empty())
        .unwrap_or_default()
}
