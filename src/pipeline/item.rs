use std::fmt;

use crate::walker::{Container, Entry};

/// Payload travelling between operators.
#[derive(Debug)]
pub enum Item {
    /// A path or a wildcard pattern
    Path(String),
    Container(Box<dyn Container>),
    Entry(Entry),
    Count(usize),
}

impl Item {
    pub fn kind(&self) -> &'static str {
        match self {
            Item::Path(_) => "path",
            Item::Container(_) => "container",
            Item::Entry(_) => "entry",
            Item::Count(_) => "count",
        }
    }

    pub fn into_entry(self) -> Option<Entry> {
        match self {
            Item::Entry(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<usize> {
        match self {
            Item::Count(count) => Some(*count),
            _ => None,
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Path(path) => f.write_str(path),
            Item::Container(container) => write!(f, "{}", container),
            Item::Entry(entry) => write!(f, "{}", entry),
            Item::Count(count) => write!(f, "{}", count),
        }
    }
}

impl From<Entry> for Item {
    fn from(entry: Entry) -> Self {
        Item::Entry(entry)
    }
}

impl From<Box<dyn Container>> for Item {
    fn from(container: Box<dyn Container>) -> Self {
        Item::Container(container)
    }
}

impl From<String> for Item {
    fn from(path: String) -> Self {
        Item::Path(path)
    }
}

impl From<&str> for Item {
    fn from(path: &str) -> Self {
        Item::Path(path.to_string())
    }
}
