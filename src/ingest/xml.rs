//! Structural RSS/Atom reader.
//!
//! `FeedElements` walks a document with `quick_xml` and yields one `RawEntry`
//! per RSS `<item>` or Atom `<entry>`, in document order. Both kinds may be
//! mixed in the same body. XML escapes are resolved and CDATA is passed
//! through as-is, so what comes out is the HTML the publisher meant; callers
//! run it through `normalize_text`.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Rss,
    Atom,
}

/// Tag contents of one element, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub kind: EntryKind,
    pub title: String,
    pub summary: String,
    pub link: String,
    pub guid: Option<String>,
    pub published: Option<String>,
    /// Atom `<category term="...">` of the entry, first one wins.
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    ContentEncoded,
    Summary,
    Content,
    Link,
    Guid,
    Id,
    PubDate,
    DcDate,
    Updated,
    Published,
}

impl Field {
    fn lookup(kind: EntryKind, name: &[u8]) -> Option<Self> {
        match (kind, name) {
            (_, b"title") => Some(Field::Title),
            (EntryKind::Rss, b"description") => Some(Field::Description),
            (EntryKind::Rss, b"content:encoded") => Some(Field::ContentEncoded),
            (EntryKind::Rss, b"link") => Some(Field::Link),
            (EntryKind::Rss, b"guid") => Some(Field::Guid),
            (EntryKind::Rss, b"pubDate") => Some(Field::PubDate),
            (EntryKind::Rss, b"dc:date") => Some(Field::DcDate),
            (EntryKind::Atom, b"summary") => Some(Field::Summary),
            (EntryKind::Atom, b"content") => Some(Field::Content),
            (EntryKind::Atom, b"id") => Some(Field::Id),
            (EntryKind::Atom, b"updated") => Some(Field::Updated),
            (EntryKind::Atom, b"published") => Some(Field::Published),
            _ => None,
        }
    }
}

/// Collected child texts of the element being read.
#[derive(Debug)]
struct Pending {
    kind: EntryKind,
    depth: usize,
    field: Option<(Field, usize)>,
    texts: Vec<(Field, String)>,
    atom_link: Option<String>,
    category: Option<String>,
}

impl Pending {
    fn new(kind: EntryKind, depth: usize) -> Self {
        Self {
            kind,
            depth,
            field: None,
            texts: Vec::new(),
            atom_link: None,
            category: None,
        }
    }

    fn push_text(&mut self, text: &str) {
        let Some((field, _)) = self.field else {
            return;
        };
        match self.texts.iter_mut().rev().find(|(f, _)| *f == field) {
            Some((_, buf)) => buf.push_str(text),
            None => self.texts.push((field, text.to_string())),
        }
    }

    fn text(&self, field: Field) -> Option<&str> {
        self.texts
            .iter()
            .find(|(f, s)| *f == field && !s.trim().is_empty())
            .map(|(_, s)| s.as_str())
    }

    fn first_of(&self, fields: &[Field]) -> Option<String> {
        fields
            .iter()
            .find_map(|f| self.text(*f))
            .map(|s| s.trim().to_string())
    }

    fn finish(self) -> RawEntry {
        match self.kind {
            EntryKind::Rss => RawEntry {
                kind: self.kind,
                title: self.first_of(&[Field::Title]).unwrap_or_default(),
                summary: self
                    .first_of(&[Field::Description, Field::ContentEncoded])
                    .unwrap_or_default(),
                link: self.first_of(&[Field::Link]).unwrap_or_default(),
                guid: self.first_of(&[Field::Guid]),
                published: self.first_of(&[Field::PubDate, Field::DcDate]),
                category: None,
            },
            EntryKind::Atom => RawEntry {
                kind: self.kind,
                title: self.first_of(&[Field::Title]).unwrap_or_default(),
                summary: self
                    .first_of(&[Field::Summary, Field::Content])
                    .unwrap_or_default(),
                link: self.atom_link.clone().unwrap_or_default(),
                guid: self.first_of(&[Field::Id]),
                published: self.first_of(&[Field::Updated, Field::Published]),
                category: self.category,
            },
        }
    }
}

/// Iterator over the items/entries of a feed document.
///
/// End tags are matched by name against the open elements, so unclosed
/// inline HTML (`<br>`, `<p>`) inside a field only affects that field.
/// A syntax error ends the iteration; elements completed before it are kept.
pub struct FeedElements<'a> {
    reader: Reader<&'a [u8]>,
    open: Vec<Vec<u8>>,
    pending: Option<Pending>,
    done: bool,
}

impl<'a> FeedElements<'a> {
    pub fn new(xml: &'a str) -> Self {
        let mut reader = Reader::from_str(xml);
        let cfg = reader.config_mut();
        cfg.trim_text(false);
        cfg.check_end_names = false;
        Self {
            reader,
            open: Vec::new(),
            pending: None,
            done: false,
        }
    }

    fn on_start(&mut self, e: &BytesStart<'_>, empty: bool) {
        let name = e.name();
        let name = name.as_ref();
        let depth = self.open.len();

        match self.pending.as_mut() {
            None => {
                let kind = match name {
                    b"item" => Some(EntryKind::Rss),
                    b"entry" => Some(EntryKind::Atom),
                    _ => None,
                };
                if let (Some(kind), false) = (kind, empty) {
                    self.pending = Some(Pending::new(kind, depth));
                }
            }
            Some(p) => {
                if p.field.is_some() {
                    // markup nested inside a text field (e.g. xhtml content)
                    if let Some(Field::Content | Field::Summary | Field::Description) =
                        p.field.map(|(f, _)| f)
                    {
                        p.push_text(" ");
                    }
                } else if depth == p.depth + 1 {
                    // only direct children of the item/entry carry its fields
                    if p.kind == EntryKind::Atom && name == b"link" {
                        if p.atom_link.is_none() && is_alternate_link(e) {
                            p.atom_link = attr(e, b"href");
                        }
                    } else if p.kind == EntryKind::Atom && name == b"category" {
                        if p.category.is_none() {
                            p.category = attr(e, b"term");
                        }
                    } else if let Some(field) = Field::lookup(p.kind, name) {
                        if !empty {
                            p.field = Some((field, depth));
                        }
                    }
                }
            }
        }

        if !empty {
            self.open.push(name.to_vec());
        }
    }

    /// Returns a finished entry when the closing tag ends one.
    ///
    /// Closing an element also closes anything left open inside it; an end
    /// tag with no matching open element is ignored.
    fn on_end(&mut self, name: &[u8]) -> Option<RawEntry> {
        let pos = self.open.iter().rposition(|n| n.as_slice() == name)?;
        self.open.truncate(pos);
        let depth = self.open.len();

        let p = self.pending.as_mut()?;
        if p.field.is_some_and(|(_, field_depth)| field_depth >= depth) {
            p.field = None;
        }
        if p.depth >= depth {
            return self.pending.take().map(Pending::finish);
        }
        None
    }
}

impl Iterator for FeedElements<'_> {
    type Item = RawEntry;

    fn next(&mut self) -> Option<RawEntry> {
        while !self.done {
            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let e = e.into_owned();
                    self.on_start(&e, false);
                }
                Ok(Event::Empty(e)) => {
                    let e = e.into_owned();
                    self.on_start(&e, true);
                }
                Ok(Event::End(e)) => {
                    if let Some(entry) = self.on_end(e.name().as_ref()) {
                        return Some(entry);
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some(p) = self.pending.as_mut() {
                        // HTML entities such as `&nbsp;` are not XML; keep those raw
                        let text = match t.unescape() {
                            Ok(s) => s.into_owned(),
                            Err(_) => String::from_utf8_lossy(&t).into_owned(),
                        };
                        p.push_text(&text);
                    }
                }
                Ok(Event::CData(c)) => {
                    if let Some(p) = self.pending.as_mut() {
                        p.push_text(&String::from_utf8_lossy(&c.into_inner()));
                    }
                }
                Ok(Event::Eof) => {
                    self.done = true;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(target: "ingest", error = %e, "feed xml parse stopped");
                    self.done = true;
                }
            }
        }
        None
    }
}

fn attr(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).trim().to_string())
        .filter(|s| !s.is_empty())
}

fn is_alternate_link(e: &BytesStart<'_>) -> bool {
    match attr(e, b"rel") {
        None => true,
        Some(rel) => rel.eq_ignore_ascii_case("alternate"),
    }
}
