use thiserror::Error;

/// A single header exactly as it arrived, apart from surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderLine {
    pub name: String,
    pub value: String,
}

impl HeaderLine {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderLineError {
    #[error("header line missing ':' separator: {line:?}")]
    MissingColon { line: String },
}

/// Ordered header multimap. Names keep their received case and repeated names
/// keep every occurrence, so re-serialization reproduces what the client sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    lines: Vec<HeaderLine>,
}

impl HeaderList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses one header line (without its terminator) and appends it.
    pub fn push_line(&mut self, line: &str) -> Result<&HeaderLine, HeaderLineError> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HeaderLineError::MissingColon {
                line: line.to_string(),
            })?;
        self.append(name.trim(), value.trim());
        Ok(&self.lines[self.lines.len() - 1])
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.lines.push(HeaderLine::new(name, value));
    }

    /// First value for `name`, compared ASCII case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.lines
            .iter()
            .find(|line| line.is(name))
            .map(|line| line.value.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.lines
            .iter()
            .filter(move |line| line.is(name))
            .map(|line| line.value.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lines.iter().any(|line| line.is(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn host(&self) -> Option<&str> {
        self.get("host")
    }
}

impl<'a> IntoIterator for &'a HeaderList {
    type Item = &'a HeaderLine;
    type IntoIter = std::slice::Iter<'a, HeaderLine>;

    fn into_iter(self) -> Self::IntoIter {
        self.lines.iter()
    }
}
