use std::{
    borrow::Cow,
    collections::BTreeMap,
    ops::Range,
};

use anyhow::{Context, bail};
use quick_xml::{
    Reader,
    escape::{escape, unescape},
    events::{BytesStart, Event},
};
use regions_shared::FieldRef;

/// Index of an element in a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(usize);

/// An attribute of an element, its value is a field of the document
#[derive(Debug, Clone)]
pub struct Attribute {
    name: String,
    field: FieldRef,
}

impl Attribute {
    /// The lowercased attribute name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self) -> FieldRef {
        self.field
    }
}

#[derive(Debug, Clone)]
pub struct Element {
    name: String,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
    attributes: Vec<Attribute>,
    text: FieldRef,
}

impl Element {
    /// The lowercased element name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// The field holding the direct text content of the element
    pub fn text(&self) -> FieldRef {
        self.text
    }
}

#[derive(Debug, Clone)]
enum Field {
    /// Character data directly inside an element. An element can hold several runs of text,
    /// separated by comments or child elements.
    Text {
        spans: Vec<Range<usize>>,
        anchor: TextAnchor,
    },
    /// The value of an attribute, without the quotes
    Attribute { value: Range<usize> },
}

/// Where text is written if an element has no character data yet
#[derive(Debug, Clone)]
enum TextAnchor {
    /// Right after the start tag
    Content(usize),
    /// The `/>` of an empty element tag, together with the raw element name
    SelfClosing { close: Range<usize>, name: String },
}

/// An XML document that remembers the exact bytes it was parsed from. Edits only replace the
/// bytes of the edited fields, everything else is written back as it was read.
#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    elements: Vec<Element>,
    fields: Vec<Field>,
    root: ElementId,
    edits: BTreeMap<FieldRef, String>,
}

impl Document {
    /// Parses the document and builds the element tree
    pub fn parse(source: String) -> anyhow::Result<Self> {
        let mut builder = Builder::default();
        let bytes = source.as_bytes();
        let mut reader = Reader::from_str(&source);
        let mut stack: Vec<ElementId> = Vec::new();
        let mut root = None;
        // End of the last markup, character data starts here
        let mut cursor = 0;

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader
                .read_event()
                .with_context(|| format!("Malformed XML at byte {}", reader.error_position()))?;
            let after = reader.buffer_position() as usize;

            match &event {
                Event::Eof => break,
                Event::Start(_)
                | Event::End(_)
                | Event::Empty(_)
                | Event::Comment(_)
                | Event::CData(_)
                | Event::Decl(_)
                | Event::PI(_)
                | Event::DocType(_) => {}
                // Character data is taken from the gaps between markup
                _ => continue,
            }

            let self_closing = matches!(event, Event::Empty(_));
            let start = markup_start(bytes, before);
            if let Some(&parent) = stack.last() {
                builder.push_text(parent, cursor..start);
            }
            cursor = after;

            match event {
                Event::Start(tag) | Event::Empty(tag) => {
                    let parent = stack.last().copied();
                    if parent.is_none() && root.is_some() {
                        bail!("Multiple root elements at byte {start}");
                    }
                    let id = builder.open(&source, &tag, start..after, parent, self_closing)?;
                    if parent.is_none() {
                        root = Some(id);
                    }
                    if !self_closing {
                        stack.push(id);
                    }
                }
                Event::End(_) => {
                    stack.pop();
                }
                _ => {}
            }
        }

        if let Some(&open) = stack.last() {
            bail!("Element <{}> is not closed", builder.elements[open.0].name);
        }
        let Some(root) = root else {
            bail!("Document has no root element");
        };

        Ok(Self {
            source,
            elements: builder.elements,
            fields: builder.fields,
            root,
            edits: BTreeMap::new(),
        })
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn children(&self, id: ElementId) -> &[ElementId] {
        &self.elements[id.0].children
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0].parent
    }

    /// The current, unescaped text of a field
    pub fn field_text(&self, field: FieldRef) -> String {
        if let Some(edit) = self.edits.get(&field) {
            return edit.clone();
        }
        let raw = match &self.fields[field.0] {
            Field::Text { spans, .. } => spans
                .iter()
                .map(|span| &self.source[span.clone()])
                .collect::<String>(),
            Field::Attribute { value } => self.source[value.clone()].to_owned(),
        };
        // Unknown entities are kept as written
        let unescaped = unescape(&raw).map(Cow::into_owned);
        unescaped.unwrap_or(raw)
    }

    /// Replaces the text of a single field
    pub fn set_field(&mut self, field: FieldRef, value: String) {
        self.edits.insert(field, value);
    }

    /// The parsed bytes with every edited field substituted
    pub fn serialize(&self) -> String {
        let mut replacements: Vec<(Range<usize>, Cow<'_, str>)> = Vec::new();
        for (field, value) in &self.edits {
            let escaped = escape(value.as_str());
            match &self.fields[field.0] {
                Field::Attribute { value } => replacements.push((value.clone(), escaped)),
                Field::Text { spans, anchor } => {
                    if let Some((first, rest)) = spans.split_first() {
                        replacements.push((first.clone(), escaped));
                        for span in rest {
                            replacements.push((span.clone(), Cow::Borrowed("")));
                        }
                    } else {
                        match anchor {
                            TextAnchor::Content(position) => {
                                replacements.push((*position..*position, escaped))
                            }
                            TextAnchor::SelfClosing { close, name } => replacements.push((
                                close.clone(),
                                Cow::Owned(format!(">{escaped}</{name}>")),
                            )),
                        }
                    }
                }
            }
        }
        replacements.sort_by_key(|(range, _)| range.start);

        let mut output = String::with_capacity(self.source.len());
        let mut position = 0;
        for (range, text) in replacements {
            output.push_str(&self.source[position..range.start]);
            output.push_str(&text);
            position = range.end;
        }
        output.push_str(&self.source[position..]);

        output
    }
}

#[derive(Default)]
struct Builder {
    elements: Vec<Element>,
    fields: Vec<Field>,
}

impl Builder {
    fn add_field(&mut self, field: Field) -> FieldRef {
        self.fields.push(field);
        FieldRef(self.fields.len() - 1)
    }

    fn open(
        &mut self,
        source: &str,
        tag: &BytesStart<'_>,
        span: Range<usize>,
        parent: Option<ElementId>,
        self_closing: bool,
    ) -> anyhow::Result<ElementId> {
        for attribute in tag.attributes() {
            attribute.with_context(|| format!("Malformed attribute at byte {}", span.start))?;
        }
        let raw_name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();

        let attributes = scan_attributes(&source[span.clone()], span.start)
            .into_iter()
            .map(|(name, value)| Attribute {
                name,
                field: self.add_field(Field::Attribute { value }),
            })
            .collect();
        let anchor = if self_closing {
            TextAnchor::SelfClosing {
                close: span.end - 2..span.end,
                name: raw_name.clone(),
            }
        } else {
            TextAnchor::Content(span.end)
        };
        let text = self.add_field(Field::Text {
            spans: Vec::new(),
            anchor,
        });

        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            name: raw_name.to_lowercase(),
            parent,
            children: Vec::new(),
            attributes,
            text,
        });
        if let Some(parent) = parent {
            self.elements[parent.0].children.push(id);
        }

        Ok(id)
    }

    fn push_text(&mut self, element: ElementId, span: Range<usize>) {
        if span.is_empty() {
            return;
        }
        let field = self.elements[element.0].text;
        if let Field::Text { spans, .. } = &mut self.fields[field.0] {
            spans.push(span);
        }
    }
}

/// The reader either stops at the `<` of the next markup or just behind it, depending on whether
/// character data preceded the markup
fn markup_start(source: &[u8], position: usize) -> usize {
    if source.get(position) == Some(&b'<') {
        position
    } else {
        position.saturating_sub(1)
    }
}

fn is_tag_delimiter(byte: u8) -> bool {
    byte.is_ascii_whitespace() || byte == b'/' || byte == b'>'
}

/// Finds the lowercased name and the absolute value span of every attribute in a start tag
fn scan_attributes(tag: &str, offset: usize) -> Vec<(String, Range<usize>)> {
    let bytes = tag.as_bytes();
    let skip_whitespace = |mut i: usize| {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    };
    let mut attributes = Vec::new();

    let mut i = 1;
    while i < bytes.len() && !is_tag_delimiter(bytes[i]) {
        i += 1;
    }
    loop {
        i = skip_whitespace(i);
        if i >= bytes.len() || bytes[i] == b'/' || bytes[i] == b'>' {
            break;
        }
        let name_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !is_tag_delimiter(bytes[i]) {
            i += 1;
        }
        let name = tag[name_start..i].to_lowercase();
        i = skip_whitespace(i);
        if bytes.get(i) != Some(&b'=') {
            continue;
        }
        i = skip_whitespace(i + 1);
        let Some(&quote) = bytes.get(i).filter(|b| **b == b'"' || **b == b'\'') else {
            break;
        };
        let value_start = i + 1;
        let Some(length) = tag[value_start..].find(char::from(quote)) else {
            break;
        };
        attributes.push((name, offset + value_start..offset + value_start + length));
        i = value_start + length + 1;
    }

    attributes
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"<?xml version="1.0"?>
<!-- regions -->
<labwc_config>
  <core><gap>10</gap></core>
  <regions>
    <region name="left" x="0%" y='0%' width="50%" height="100%" />
    <Region>
      <name>right</name>
      <x>50%</x> <!-- keep -->
      <y/>
    </Region>
  </regions>
</labwc_config>
"#;

    fn parse(source: &str) -> Document {
        Document::parse(source.to_owned()).unwrap()
    }

    fn find(document: &Document, path: &[&str]) -> ElementId {
        let mut id = document.root();
        for name in path {
            id = *document
                .children(id)
                .iter()
                .find(|child| document.element(**child).is_named(name))
                .unwrap();
        }
        id
    }

    #[test]
    fn unmodified_document_is_byte_identical() {
        let document = parse(CONFIG);
        assert_eq!(document.serialize(), CONFIG);
    }

    #[test]
    fn builds_a_lowercased_tree() {
        let document = parse(CONFIG);
        let root = document.root();
        assert_eq!(document.element(root).name(), "labwc_config");
        assert_eq!(document.children(root).len(), 2);

        let region = find(&document, &["regions", "region"]);
        let names: Vec<_> = document
            .element(region)
            .attributes()
            .iter()
            .map(Attribute::name)
            .collect();
        assert_eq!(names, ["name", "x", "y", "width", "height"]);

        let second = document.children(find(&document, &["regions"]))[1];
        assert_eq!(document.element(second).name(), "region");
        assert_eq!(
            document.parent(second),
            Some(find(&document, &["regions"]))
        );
    }

    #[test]
    fn field_text_reads_attributes_and_text() {
        let document = parse(CONFIG);
        let region = document.element(find(&document, &["regions", "region"]));
        assert_eq!(document.field_text(region.attributes()[0].field()), "left");
        assert_eq!(document.field_text(region.attributes()[2].field()), "0%");

        let gap = document.element(find(&document, &["core", "gap"]));
        assert_eq!(document.field_text(gap.text()), "10");
    }

    #[test]
    fn entities_are_unescaped() {
        let document = parse("<a b=\"x &amp; y\">1 &lt; 2</a>");
        let root = document.element(document.root());
        assert_eq!(document.field_text(root.attributes()[0].field()), "x & y");
        assert_eq!(document.field_text(root.text()), "1 < 2");
    }

    #[test]
    fn edits_only_touch_the_field_bytes() {
        let mut document = parse(CONFIG);
        let region = document.element(find(&document, &["regions", "region"])).clone();
        let x = document.children(find(&document, &["regions"]))[1];
        let x = document.children(x)[1];
        let x_text = document.element(x).text();

        document.set_field(region.attributes()[1].field(), String::from("25%"));
        document.set_field(x_text, String::from("75%"));

        let expected = CONFIG
            .replace(r#"x="0%""#, r#"x="25%""#)
            .replace("<x>50%</x>", "<x>75%</x>");
        assert_eq!(document.serialize(), expected);
        assert_eq!(document.field_text(x_text), "75%");
    }

    #[test]
    fn empty_element_is_expanded() {
        let mut document = parse(CONFIG);
        let second = document.children(find(&document, &["regions"]))[1];
        let y = document.children(second)[2];
        assert_eq!(document.element(y).name(), "y");

        document.set_field(document.element(y).text(), String::from("10%"));
        assert_eq!(
            document.serialize(),
            CONFIG.replace("<y/>", "<y>10%</y>")
        );
    }

    #[test]
    fn empty_start_end_pair_gets_text_inserted() {
        let mut document = parse("<a><b></b></a>");
        let b = document.children(document.root())[0];
        document.set_field(document.element(b).text(), String::from("1"));
        assert_eq!(document.serialize(), "<a><b>1</b></a>");
    }

    #[test]
    fn split_text_is_written_to_the_first_run() {
        let mut document = parse("<a>1<!-- c -->2</a>");
        let text = document.element(document.root()).text();
        assert_eq!(document.field_text(text), "12");

        document.set_field(text, String::from("3"));
        assert_eq!(document.serialize(), "<a>3<!-- c --></a>");
    }

    #[test]
    fn written_values_are_escaped() {
        let mut document = parse(r#"<a b="1"/>"#);
        let field = document.element(document.root()).attributes()[0].field();
        document.set_field(field, String::from("\"<&>\""));
        assert_eq!(
            document.serialize(),
            r#"<a b="&quot;&lt;&amp;&gt;&quot;"/>"#
        );
    }

    #[test]
    fn malformed_documents_are_rejected() {
        assert!(Document::parse(String::from("<a><b></a>")).is_err());
        assert!(Document::parse(String::from("<a><b></b>")).is_err());
        assert!(Document::parse(String::from("<!-- nothing -->")).is_err());
        assert!(Document::parse(String::from("<a/><b/>")).is_err());
        assert!(Document::parse(String::new()).is_err());
    }
}
