//! Reading-order keys for KOReader position tokens.
//!
//! EPUB positions are XPointers such as
//! `/body/DocFragment[12]/body/div/p[3]/text().17`. PDF positions are
//! encoded by the extractor as `pdf:<page>:<y>:<x>`, and a bare integer is
//! a page number.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: String,
    index: u64,
}

/// A parsed position that can be ordered against positions of the same book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionKey {
    steps: Vec<Step>,
}

impl PositionKey {
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if let Some(rest) = token.strip_prefix("pdf:") {
            return parse_pdf(rest);
        }
        if let Ok(page) = token.parse::<u64>() {
            return Some(Self {
                steps: vec![Step { name: "page".to_string(), index: page }],
            });
        }
        parse_xpointer(token)
    }

    /// Total order used for sorting: step by step on (index, name), then
    /// shorter paths first
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.steps.iter().zip(&other.steps) {
            let ord = a.index.cmp(&b.index).then_with(|| a.name.cmp(&b.name));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.steps.len().cmp(&other.steps.len())
    }

    /// Whether `sort_cmp` reflects reading order for this pair.
    ///
    /// Indices only mean something between siblings with the same element
    /// name, so the first differing step has to share its name.
    pub fn comparable(&self, other: &Self) -> bool {
        self.steps
            .iter()
            .zip(&other.steps)
            .find(|(a, b)| a != b)
            .map_or(true, |(a, b)| a.name == b.name)
    }
}

fn parse_pdf(rest: &str) -> Option<PositionKey> {
    let mut parts = rest.split(':');
    let page = parts.next()?.parse::<u64>().ok()?;
    let mut steps = vec![Step { name: "page".to_string(), index: page }];
    for name in ["y", "x"] {
        let value = parts.next()?.parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        // Hundredths of a point are plenty to tell highlights apart
        steps.push(Step {
            name: name.to_string(),
            index: (value.max(0.0) * 100.0).round() as u64,
        });
    }
    if parts.next().is_some() {
        return None;
    }
    Some(PositionKey { steps })
}

fn parse_xpointer(token: &str) -> Option<PositionKey> {
    let path = token.strip_prefix('/')?;
    let mut steps = Vec::new();

    for segment in path.split('/') {
        if segment.is_empty() {
            return None;
        }

        // `name[index].offset`, both suffixes optional
        let (element, offset) = match segment.rfind('.') {
            Some(dot) if segment[dot + 1..].chars().all(|c| c.is_ascii_digit()) && dot + 1 < segment.len() => {
                (&segment[..dot], Some(segment[dot + 1..].parse::<u64>().ok()?))
            }
            _ => (segment, None),
        };

        let (name, index) = match element.find('[') {
            Some(open) => {
                let close = element.strip_suffix(']')?;
                let index = close[open + 1..].parse::<u64>().ok()?;
                (&element[..open], index)
            }
            None => (element, 1),
        };

        if name.is_empty() {
            return None;
        }

        steps.push(Step { name: name.to_string(), index });
        if let Some(offset) = offset {
            steps.push(Step { name: ".".to_string(), index: offset });
        }
    }

    (!steps.is_empty()).then_some(PositionKey { steps })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(token: &str) -> PositionKey {
        PositionKey::parse(token).unwrap_or_else(|| panic!("failed to parse {}", token))
    }

    #[test]
    fn test_parse_xpointer() {
        let k = key("/body/DocFragment[12]/body/div/p[3]/text().17");
        assert_eq!(k.steps.len(), 7);
        assert_eq!(k.steps[1], Step { name: "DocFragment".to_string(), index: 12 });
        assert_eq!(k.steps[6], Step { name: ".".to_string(), index: 17 });
    }

    #[test]
    fn test_numeric_not_lexical_order() {
        let a = key("/body/DocFragment[9]/body/p[2]/text().0");
        let b = key("/body/DocFragment[10]/body/p[1]/text().0");
        assert_eq!(a.sort_cmp(&b), Ordering::Less);
        assert!(a.comparable(&b));
    }

    #[test]
    fn test_offsets_order_within_a_node() {
        let a = key("/body/DocFragment[3]/body/p[2]/text().40");
        let b = key("/body/DocFragment[3]/body/p[2]/text().5");
        assert_eq!(a.sort_cmp(&b), Ordering::Greater);
    }

    #[test]
    fn test_different_sibling_names_are_not_comparable() {
        let a = key("/body/DocFragment[3]/body/p[4]/text().0");
        let b = key("/body/DocFragment[3]/body/div[1]/text().0");
        assert!(!a.comparable(&b));
    }

    #[test]
    fn test_prefix_is_comparable_and_first() {
        let a = key("/body/DocFragment[3]/body/p[4]");
        let b = key("/body/DocFragment[3]/body/p[4]/text().2");
        assert!(a.comparable(&b));
        assert_eq!(a.sort_cmp(&b), Ordering::Less);
    }

    #[test]
    fn test_pdf_and_page_tokens() {
        let a = key("pdf:3:120.5:40");
        let b = key("pdf:3:300:10");
        let c = key("4");
        assert_eq!(a.sort_cmp(&b), Ordering::Less);
        assert_eq!(b.sort_cmp(&c), Ordering::Less);
        assert!(b.comparable(&c));
    }

    #[test]
    fn test_unparseable_tokens() {
        assert!(PositionKey::parse("#3").is_none());
        assert!(PositionKey::parse("").is_none());
        assert!(PositionKey::parse("/body//p").is_none());
        assert!(PositionKey::parse("/body/p[x]").is_none());
        assert!(PositionKey::parse("pdf:1:2").is_none());
    }
}
