//! Minimal CSS selector engine used by [`super::MemoryDom`].
//!
//! Supported: type selectors, `*`, `#id`, `.class`, attribute selectors
//! (`[a]`, `[a=v]`, `[a~=v]`, `[a*=v]`, `[a^=v]`, `[a$=v]`), compound selectors,
//! descendant and child combinators, and comma-separated groups. Anything else
//! (pseudo-classes, sibling combinators) is rejected as invalid.

use super::{DomError, DomResult, NodeId};

/// What the matcher needs to know about the tree.
pub trait SelectorContext {
    fn tag_name(&self, node: NodeId) -> Option<&str>;
    fn attribute(&self, node: NodeId, name: &str) -> Option<&str>;
    /// Parent element in the same tree scope (never crosses a shadow root).
    fn parent_element(&self, node: NodeId) -> Option<NodeId>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    selectors: Vec<ComplexSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ComplexSelector {
    /// Left to right; the last compound is the subject.
    compounds: Vec<Compound>,
    /// `combinators[i]` sits between `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrOp {
    Exists,
    Equals(String),
    Includes(String),
    Contains(String),
    Prefix(String),
    Suffix(String),
}

impl SelectorList {
    pub fn parse(input: &str) -> DomResult<Self> {
        let mut selectors = Vec::new();
        for group in split_groups(input)? {
            selectors.push(parse_complex(group.trim(), input)?);
        }
        if selectors.is_empty() {
            return Err(DomError::InvalidSelector(input.to_string()));
        }
        Ok(Self { selectors })
    }

    pub fn matches<C: SelectorContext + ?Sized>(&self, ctx: &C, node: NodeId) -> bool {
        self.selectors.iter().any(|complex| {
            let last = complex.compounds.len() - 1;
            matches_at(ctx, node, complex, last)
        })
    }
}

fn matches_at<C: SelectorContext + ?Sized>(
    ctx: &C,
    node: NodeId,
    complex: &ComplexSelector,
    idx: usize,
) -> bool {
    if !compound_matches(ctx, node, &complex.compounds[idx]) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match complex.combinators[idx - 1] {
        Combinator::Child => ctx
            .parent_element(node)
            .is_some_and(|parent| matches_at(ctx, parent, complex, idx - 1)),
        Combinator::Descendant => {
            let mut current = ctx.parent_element(node);
            while let Some(ancestor) = current {
                if matches_at(ctx, ancestor, complex, idx - 1) {
                    return true;
                }
                current = ctx.parent_element(ancestor);
            }
            false
        }
    }
}

fn compound_matches<C: SelectorContext + ?Sized>(ctx: &C, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = ctx.tag_name(node) else {
        return false;
    };
    if let Some(expected) = &compound.tag {
        if !expected.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &compound.id {
        if ctx.attribute(node, "id") != Some(id.as_str()) {
            return false;
        }
    }
    if !compound.classes.is_empty() {
        let class_attr = ctx.attribute(node, "class").unwrap_or("");
        let has_all = compound
            .classes
            .iter()
            .all(|class| class_attr.split_whitespace().any(|c| c == class.as_str()));
        if !has_all {
            return false;
        }
    }
    compound.attrs.iter().all(|attr| {
        let Some(value) = ctx.attribute(node, &attr.name) else {
            return false;
        };
        match &attr.op {
            AttrOp::Exists => true,
            AttrOp::Equals(v) => value == v.as_str(),
            AttrOp::Includes(v) => value.split_whitespace().any(|w| w == v.as_str()),
            AttrOp::Contains(v) => !v.is_empty() && value.contains(v.as_str()),
            AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
            AttrOp::Suffix(v) => !v.is_empty() && value.ends_with(v.as_str()),
        }
    })
}

/// Splits on top-level commas (commas inside quotes or brackets are kept).
fn split_groups(input: &str) -> DomResult<Vec<&str>> {
    let mut groups = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (i, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(ch),
            (None, '[') => depth += 1,
            (None, ']') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                groups.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return Err(DomError::InvalidSelector(input.to_string()));
    }
    groups.push(&input[start..]);
    if groups.iter().any(|g| g.trim().is_empty()) {
        return Err(DomError::InvalidSelector(input.to_string()));
    }
    Ok(groups)
}

fn parse_complex(group: &str, full: &str) -> DomResult<ComplexSelector> {
    let invalid = || DomError::InvalidSelector(full.to_string());
    let chars: Vec<char> = group.chars().collect();
    let mut pos = 0;
    let mut compounds = Vec::new();
    let mut combinators = Vec::new();
    let mut pending: Option<Combinator> = None;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            if !compounds.is_empty() && pending.is_none() {
                pending = Some(Combinator::Descendant);
            }
            pos += 1;
            continue;
        }
        if c == '>' {
            if compounds.is_empty() || pending == Some(Combinator::Child) {
                return Err(invalid());
            }
            pending = Some(Combinator::Child);
            pos += 1;
            continue;
        }

        let (compound, next) = parse_compound(&chars, pos).ok_or_else(invalid)?;
        if !compounds.is_empty() {
            combinators.push(pending.take().ok_or_else(invalid)?);
        }
        compounds.push(compound);
        pos = next;
    }

    if compounds.is_empty() || pending == Some(Combinator::Child) {
        return Err(invalid());
    }
    Ok(ComplexSelector {
        compounds,
        combinators,
    })
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn read_ident(chars: &[char], mut pos: usize) -> (String, usize) {
    let start = pos;
    while pos < chars.len() && is_ident_char(chars[pos]) {
        pos += 1;
    }
    (chars[start..pos].iter().collect(), pos)
}

fn parse_compound(chars: &[char], mut pos: usize) -> Option<(Compound, usize)> {
    let mut compound = Compound::default();
    let start = pos;

    if chars[pos] == '*' {
        pos += 1;
    } else if is_ident_char(chars[pos]) {
        let (tag, next) = read_ident(chars, pos);
        compound.tag = Some(tag.to_ascii_lowercase());
        pos = next;
    }

    while pos < chars.len() {
        match chars[pos] {
            '#' => {
                let (id, next) = read_ident(chars, pos + 1);
                if id.is_empty() {
                    return None;
                }
                compound.id = Some(id);
                pos = next;
            }
            '.' => {
                let (class, next) = read_ident(chars, pos + 1);
                if class.is_empty() {
                    return None;
                }
                compound.classes.push(class);
                pos = next;
            }
            '[' => {
                let (attr, next) = parse_attr(chars, pos + 1)?;
                compound.attrs.push(attr);
                pos = next;
            }
            c if c.is_whitespace() || c == '>' => break,
            _ => return None,
        }
    }

    if pos == start {
        return None;
    }
    Some((compound, pos))
}

fn skip_ws(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

fn parse_attr(chars: &[char], pos: usize) -> Option<(AttrSelector, usize)> {
    let pos = skip_ws(chars, pos);
    let (name, pos) = read_ident(chars, pos);
    if name.is_empty() {
        return None;
    }
    let mut pos = skip_ws(chars, pos);
    let name = name.to_ascii_lowercase();

    if *chars.get(pos)? == ']' {
        return Some((
            AttrSelector {
                name,
                op: AttrOp::Exists,
            },
            pos + 1,
        ));
    }

    let prefix = *chars.get(pos)?;
    let kind = if prefix == '=' {
        pos += 1;
        '='
    } else {
        if *chars.get(pos + 1)? != '=' {
            return None;
        }
        pos += 2;
        prefix
    };

    pos = skip_ws(chars, pos);
    let value = match *chars.get(pos)? {
        q @ ('"' | '\'') => {
            let start = pos + 1;
            let mut end = start;
            while *chars.get(end)? != q {
                end += 1;
            }
            pos = end + 1;
            chars[start..end].iter().collect::<String>()
        }
        _ => {
            let (ident, next) = read_ident(chars, pos);
            if ident.is_empty() {
                return None;
            }
            pos = next;
            ident
        }
    };

    pos = skip_ws(chars, pos);
    if *chars.get(pos)? != ']' {
        return None;
    }

    let op = match kind {
        '=' => AttrOp::Equals(value),
        '~' => AttrOp::Includes(value),
        '*' => AttrOp::Contains(value),
        '^' => AttrOp::Prefix(value),
        '$' => AttrOp::Suffix(value),
        _ => return None,
    };
    Some((AttrSelector { name, op }, pos + 1))
}
