//! Parser for the brace-structured schema text stored with every table.
//!
//! ```text
//! {"NAME",0,
//! {"Fields",
//! {"ID","B",0,16,0,"CS"},
//! {"DESCR","NVC",1,150,0,"CI"}
//! },
//! {"Indexes",...},
//! {"Recordlock","0"},
//! {"Files",12,34,56}
//! }
//! ```
//!
//! The text is tokenized into nested groups of quoted strings and bare
//! atoms, then matched against the shape above.  Index definitions are
//! skipped.

use thiserror::Error;

use super::{FieldDescriptor, FieldType, TableSchema};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("syntax error at character {pos}: {msg}")]
    Syntax { pos: usize, msg: String },
    #[error("unexpected structure: {0}")]
    Structure(String),
    #[error("field {field} has unknown type {tag:?}")]
    UnknownType { field: String, tag: String },
    #[error("{what}: {value:?} is not a number")]
    BadNumber { what: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Str(String),
    Atom(String),
    Group(Vec<Item>),
}

impl Item {
    fn label(&self) -> Option<&str> {
        match self {
            Item::Group(items) => match items.first() {
                Some(Item::Str(s)) => Some(s.as_str()),
                _ => None,
            },
            _ => None,
        }
    }

    fn text(&self) -> Option<&str> {
        match self {
            Item::Str(s) | Item::Atom(s) => Some(s.as_str()),
            Item::Group(_) => None,
        }
    }
}

// ── Tokenizer ───────────────────────────────────────────────────────────────

struct Tokenizer {
    chars: Vec<char>,
    pos:   usize,
}

impl Tokenizer {
    fn new(text: &str) -> Self {
        Self { chars: text.chars().collect(), pos: 0 }
    }

    fn skip_blank(&mut self) {
        while let Some(&c) = self.chars.get(self.pos) {
            if c.is_whitespace() || c == '\u{feff}' || c == '\0' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn error(&self, msg: impl Into<String>) -> SchemaError {
        SchemaError::Syntax { pos: self.pos, msg: msg.into() }
    }

    fn item(&mut self) -> Result<Item, SchemaError> {
        self.skip_blank();
        match self.chars.get(self.pos) {
            Some('{') => self.group(),
            Some('"') => self.string(),
            Some(_)   => self.atom(),
            None      => Err(self.error("unexpected end of text")),
        }
    }

    fn group(&mut self) -> Result<Item, SchemaError> {
        self.pos += 1;
        let mut items = Vec::new();
        self.skip_blank();
        if self.chars.get(self.pos) == Some(&'}') {
            self.pos += 1;
            return Ok(Item::Group(items));
        }
        loop {
            items.push(self.item()?);
            self.skip_blank();
            match self.chars.get(self.pos) {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(Item::Group(items));
                }
                Some(c) => return Err(self.error(format!("expected ',' or '}}', found {c:?}"))),
                None => return Err(self.error("unterminated group")),
            }
        }
    }

    fn string(&mut self) -> Result<Item, SchemaError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.chars.get(self.pos) {
                Some('"') if self.chars.get(self.pos + 1) == Some(&'"') => {
                    out.push('"');
                    self.pos += 2;
                }
                Some('"') => {
                    self.pos += 1;
                    return Ok(Item::Str(out));
                }
                Some(&c) => {
                    out.push(c);
                    self.pos += 1;
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn atom(&mut self) -> Result<Item, SchemaError> {
        let start = self.pos;
        while let Some(&c) = self.chars.get(self.pos) {
            if c == ',' || c == '}' || c == '{' || c.is_whitespace() {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a value"));
        }
        Ok(Item::Atom(self.chars[start..self.pos].iter().collect()))
    }
}

// ── Structure ───────────────────────────────────────────────────────────────

fn structure(msg: impl Into<String>) -> SchemaError {
    SchemaError::Structure(msg.into())
}

fn number(item: &Item, what: &'static str) -> Result<u32, SchemaError> {
    let text = item.text().ok_or_else(|| structure(format!("{what} must be a scalar")))?;
    text.trim()
        .parse()
        .map_err(|_| SchemaError::BadNumber { what, value: text.to_owned() })
}

fn string<'i>(item: &'i Item, what: &str) -> Result<&'i str, SchemaError> {
    match item {
        Item::Str(s) => Ok(s),
        _ => Err(structure(format!("{what} must be a quoted string"))),
    }
}

fn section<'i>(items: &'i [Item], label: &str) -> Option<&'i [Item]> {
    items.iter().find(|i| i.label() == Some(label)).and_then(|i| match i {
        Item::Group(inner) => Some(&inner[1..]),
        _ => None,
    })
}

fn field(item: &Item) -> Result<FieldDescriptor, SchemaError> {
    let parts = match item {
        Item::Group(parts) if parts.len() == 6 => parts,
        _ => return Err(structure("field tuple must have six elements")),
    };
    let name = string(&parts[0], "field name")?.to_owned();
    let tag = string(&parts[1], "field type")?;
    let field_type = FieldType::from_tag(tag)
        .ok_or_else(|| SchemaError::UnknownType { field: name.clone(), tag: tag.to_owned() })?;
    Ok(FieldDescriptor {
        nullable:       number(&parts[2], "nullable flag")? == 1,
        length:         number(&parts[3], "field length")?,
        precision:      number(&parts[4], "field precision")?,
        case_sensitive: parts[5].text() == Some("CS"),
        offset:         0,
        byte_size:      0,
        field_type,
        name,
    })
}

/// Parse schema text into a [`TableSchema`] with its row layout computed.
pub fn parse(text: &str) -> Result<TableSchema, SchemaError> {
    let mut tokenizer = Tokenizer::new(text);
    let root = tokenizer.item()?;
    tokenizer.skip_blank();
    if tokenizer.pos < tokenizer.chars.len() {
        return Err(tokenizer.error("trailing text after table description"));
    }

    let items = match &root {
        Item::Group(items) if items.len() >= 2 => items,
        _ => return Err(structure("table description must start with name and count")),
    };
    let name = string(&items[0], "table name")?.to_owned();
    number(&items[1], "table header count")?;

    let fields = section(items, "Fields")
        .ok_or_else(|| structure(format!("table {name} has no Fields section")))?
        .iter()
        .map(field)
        .collect::<Result<Vec<_>, _>>()?;
    if section(items, "Indexes").is_none() {
        return Err(structure(format!("table {name} has no Indexes section")));
    }
    let record_lock = match section(items, "Recordlock") {
        Some([flag]) => number(flag, "record lock flag")? == 1,
        _ => return Err(structure(format!("table {name} has no Recordlock flag"))),
    };
    let files = match section(items, "Files") {
        Some([data, blob, index]) => [
            number(data, "data address")?,
            number(blob, "blob address")?,
            number(index, "index address")?,
        ],
        _ => return Err(structure(format!("table {name} has no Files section with three addresses"))),
    };

    Ok(TableSchema::with_layout(name, fields, record_lock, files, text.to_owned()))
}
