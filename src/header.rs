//! The parsed document model: properties, elements and the header that owns
//! them.

use std::{
    fmt,
    io::{self, BufRead, Write},
};

use log::warn;

use crate::{
    binding::Bindings,
    error::Error,
    types::ScalarType,
};


// ===========================================================================
// ===== `Format`
// ===========================================================================

/// The encoding of the payload following the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

impl Format {
    /// Returns the binary format with the endianness of the host.
    pub fn binary_native() -> Self {
        #[cfg(target_endian = "big")]
        {
            Format::BinaryBigEndian
        }

        #[cfg(target_endian = "little")]
        {
            Format::BinaryLittleEndian
        }
    }

    /// The keyword used in the `format` header line.
    pub fn keyword(self) -> &'static str {
        match self {
            Format::Ascii => "ascii",
            Format::BinaryLittleEndian => "binary_little_endian",
            Format::BinaryBigEndian => "binary_big_endian",
        }
    }

    fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "ascii" => Some(Format::Ascii),
            "binary_little_endian" => Some(Format::BinaryLittleEndian),
            "binary_big_endian" => Some(Format::BinaryBigEndian),
            _ => None,
        }
    }

    pub fn is_binary(self) -> bool {
        self != Format::Ascii
    }

    /// Whether the byte order of this format differs from the host's. Always
    /// `false` for ASCII.
    pub(crate) fn needs_swap(self) -> bool {
        self.is_binary() && self != Self::binary_native()
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.keyword().fmt(f)
    }
}


// ===========================================================================
// ===== `Property` and `Element`
// ===========================================================================

/// A named field of an element. Either a single scalar or a list of scalars
/// prefixed by a count field of type `list_type`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub scalar_type: ScalarType,

    /// Type of the count field, `None` for scalar properties.
    pub list_type: Option<ScalarType>,

    /// Number of items per record. Only meaningful for list properties: it is
    /// given when writing and learned from the first record when reading
    /// without hint.
    pub list_count: usize,
}

impl Property {
    pub fn scalar(name: impl Into<String>, scalar_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            list_type: None,
            list_count: 0,
        }
    }

    pub fn list(
        name: impl Into<String>,
        list_type: ScalarType,
        scalar_type: ScalarType,
        list_count: usize,
    ) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            list_type: Some(list_type),
            list_count,
        }
    }

    pub fn is_list(&self) -> bool {
        self.list_type.is_some()
    }

    /// Parses everything after the `property` keyword.
    fn parse<'a>(mut tokens: impl Iterator<Item = &'a str>, line: usize) -> Result<Self, Error> {
        fn ty(token: Option<&str>, line: usize) -> Result<ScalarType, Error> {
            let token = token.ok_or_else(|| Error::malformed(line, "incomplete property line"))?;
            token.parse::<ScalarType>().map_err(|e| Error::malformed(line, e.to_string()))
        }

        let first = tokens.next();
        let prop = if first == Some("list") {
            let list_type = ty(tokens.next(), line)?;
            if !list_type.is_integer() {
                return Err(Error::malformed(
                    line,
                    format!("list count type has to be an integer type, but is '{}'", list_type),
                ));
            }
            let scalar_type = ty(tokens.next(), line)?;
            let name = tokens.next()
                .ok_or_else(|| Error::malformed(line, "property without name"))?;
            Property::list(name, list_type, scalar_type, 0)
        } else {
            let scalar_type = ty(first, line)?;
            let name = tokens.next()
                .ok_or_else(|| Error::malformed(line, "property without name"))?;
            Property::scalar(name, scalar_type)
        };

        Ok(prop)
    }

    fn write(&self, w: &mut impl Write) -> io::Result<()> {
        match self.list_type {
            Some(list_type) => writeln!(
                w,
                "property list {} {} {}",
                list_type,
                self.scalar_type,
                self.name,
            ),
            None => writeln!(w, "property {} {}", self.scalar_type, self.name),
        }
    }

    fn report(&self, prefix: &str, w: &mut impl Write) -> io::Result<()> {
        write!(w, "{}\tproperty: {} (type={})", prefix, self.name, self.scalar_type)?;
        if let Some(list_type) = self.list_type {
            write!(w, " (list_type={})", list_type)?;
        }
        writeln!(w)
    }
}

/// A named batch of `size` records, each consisting of `properties` in
/// declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub size: usize,
    pub properties: Vec<Property>,
}

impl Element {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            properties: Vec::new(),
        }
    }

    /// Returns the index of the property with the given name.
    pub fn find_property(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find_property(name).is_some()
    }

    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Appends one property per key, all of the same type. Fails without
    /// modifying the element if any key is already declared.
    pub(crate) fn create_properties(
        &mut self,
        keys: &[&str],
        scalar_type: ScalarType,
        list_type: Option<ScalarType>,
        list_count: usize,
    ) -> Result<(), Error> {
        for (i, key) in keys.iter().enumerate() {
            if self.contains(key) || keys[..i].contains(key) {
                return Err(Error::DuplicateRequest {
                    element: self.name.clone(),
                    property: key.to_string(),
                });
            }
        }

        self.properties.extend(keys.iter().map(|&key| match list_type {
            Some(list_type) => Property::list(key, list_type, scalar_type, list_count),
            None => Property::scalar(key, scalar_type),
        }));

        Ok(())
    }

    fn report(&self, prefix: &str, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "{}element: {} ({})", prefix, self.name, self.size)?;
        for p in &self.properties {
            p.report(prefix, w)?;
        }
        Ok(())
    }
}


// ===========================================================================
// ===== `Header`
// ===========================================================================

/// Everything in front of the payload plus the table of requested
/// properties.
#[derive(Debug, Clone, Default)]
pub struct Header {
    pub elements: Vec<Element>,
    pub comments: Vec<String>,
    pub obj_info: Vec<String>,
    pub is_binary: bool,
    pub is_big_endian: bool,
    pub(crate) bindings: Bindings,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format(&self) -> Format {
        match (self.is_binary, self.is_big_endian) {
            (false, _) => Format::Ascii,
            (true, false) => Format::BinaryLittleEndian,
            (true, true) => Format::BinaryBigEndian,
        }
    }

    pub fn set_format(&mut self, format: Format) {
        self.is_binary = format.is_binary();
        self.is_big_endian = format == Format::BinaryBigEndian;
    }

    pub fn find_element(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.name == name)
    }

    pub fn element(&self, name: &str) -> Option<&Element> {
        self.elements.iter().find(|e| e.name == name)
    }

    /// Reads header lines until (and including) `end_header`.
    ///
    /// Returns `Ok(false)` if lines with unknown keywords were encountered.
    /// They are skipped with a warning and everything else is still parsed.
    /// Structural problems are hard errors. The second value is the number of
    /// bytes consumed, i.e. the offset at which the payload starts.
    pub fn parse(&mut self, reader: &mut impl BufRead) -> Result<(bool, u64), Error> {
        let mut success = true;
        let mut consumed = 0u64;
        let mut raw = Vec::new();
        let mut line_no = 0;

        loop {
            raw.clear();
            let n = reader.read_until(b'\n', &mut raw)?;
            if n == 0 {
                return Err(Error::malformed(line_no, "unexpected EOF, no 'end_header' found"));
            }
            consumed += n as u64;
            line_no += 1;

            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(&['\n', '\r'][..]);
            let mut tokens = line.split_ascii_whitespace();
            let keyword = match tokens.next() {
                Some(k) => k,
                None => continue,
            };

            match keyword {
                "ply" | "PLY" => {}
                "comment" => self.comments.push(line_text(line, keyword)),
                "obj_info" => self.obj_info.push(line_text(line, keyword)),
                "format" => {
                    let value = tokens.next().unwrap_or("");
                    match Format::from_keyword(value) {
                        Some(format) => self.set_format(format),
                        None => {
                            warn!("unknown PLY format '{}', assuming ascii", value);
                            self.set_format(Format::Ascii);
                        }
                    }
                }
                "element" => {
                    let name = tokens.next()
                        .ok_or_else(|| Error::malformed(line_no, "element without name"))?;
                    let size = tokens.next()
                        .ok_or_else(|| Error::malformed(line_no, "element without count"))?;
                    let size = size.parse::<usize>().map_err(|_| {
                        Error::malformed(line_no, format!("invalid element count '{}'", size))
                    })?;
                    self.elements.push(Element::new(name, size));
                }
                "property" => {
                    let prop = Property::parse(tokens, line_no)?;
                    let elem = self.elements.last_mut().ok_or_else(|| {
                        Error::malformed(line_no, "no elements defined; file is malformed")
                    })?;
                    elem.properties.push(prop);
                }
                "end_header" => break,
                other => {
                    warn!("unexpected header field encountered: '{}' (line {})", other, line_no);
                    success = false;
                }
            }
        }

        Ok((success, consumed))
    }

    /// Writes the complete header including the final `end_header` line.
    /// Numbers never depend on any locale, so decimal separators are always
    /// `.`.
    pub fn write(&self, w: &mut impl Write) -> io::Result<()> {
        writeln!(w, "ply")?;
        writeln!(w, "format {} 1.0", self.format())?;
        for comment in &self.comments {
            writeln!(w, "comment {}", comment)?;
        }
        for info in &self.obj_info {
            writeln!(w, "obj_info {}", info)?;
        }

        for elem in &self.elements {
            writeln!(w, "element {} {}", elem.name, elem.size)?;
            for prop in &elem.properties {
                prop.write(w)?;
            }
        }
        writeln!(w, "end_header")
    }

    /// Writes a human readable summary of the structure.
    pub fn report(&self, w: &mut impl Write) -> io::Result<()> {
        const PREFIX: &str = "\t[ply_header] ";

        let ty = if self.is_binary { "binary" } else { "ascii" };
        writeln!(w, "{}Type: {}", PREFIX, ty)?;
        for c in &self.comments {
            writeln!(w, "{}Comment: {}", PREFIX, c)?;
        }
        for c in &self.obj_info {
            writeln!(w, "{}Info: {}", PREFIX, c)?;
        }
        for e in &self.elements {
            e.report(PREFIX, w)?;
        }
        Ok(())
    }
}

/// The text after `keyword` with one separating space removed.
fn line_text(line: &str, keyword: &str) -> String {
    let rest = line.trim_start();
    let rest = &rest[keyword.len()..];
    let rest = rest.strip_prefix(&[' ', '\t'][..]).unwrap_or(rest);
    rest.to_string()
}


#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use super::*;

    fn parse(s: &str) -> Result<(Header, bool, u64), Error> {
        let mut header = Header::new();
        let (ok, len) = header.parse(&mut Cursor::new(s.as_bytes()))?;
        Ok((header, ok, len))
    }

    #[test]
    fn full_header() -> Result<(), failure::Error> {
        let src = "ply\n\
            format binary_big_endian 1.0\n\
            comment made by hand\n\
            comment   indented  text \n\
            obj_info scanner 3\n\
            element vertex 8\n\
            property float32 x\n\
            property float y\n\
            property double z\n\
            element face 6\n\
            property list uchar int vertex_indices\n\
            end_header\n\
            PAYLOAD";
        let (header, ok, len) = parse(src)?;

        assert!(ok);
        assert_eq!(len as usize, src.len() - "PAYLOAD".len());
        assert_eq!(header.format(), Format::BinaryBigEndian);
        assert!(header.is_binary);
        assert!(header.is_big_endian);
        assert_eq!(header.comments, ["made by hand", "  indented  text "]);
        assert_eq!(header.obj_info, ["scanner 3"]);

        assert_eq!(header.elements.len(), 2);
        let vertex = &header.elements[0];
        assert_eq!(vertex.name, "vertex");
        assert_eq!(vertex.size, 8);
        assert_eq!(vertex.properties, vec![
            Property::scalar("x", ScalarType::Float32),
            Property::scalar("y", ScalarType::Float32),
            Property::scalar("z", ScalarType::Float64),
        ]);

        let face = &header.elements[1];
        assert_eq!(face.size, 6);
        assert_eq!(
            face.properties,
            vec![Property::list("vertex_indices", ScalarType::Uint8, ScalarType::Int32, 0)],
        );
        assert!(face.properties[0].is_list());
        assert_eq!(header.find_element("face"), Some(1));
        assert_eq!(face.find_property("vertex_indices"), Some(0));
        assert!(!face.contains("x"));

        Ok(())
    }

    #[test]
    fn crlf_lines() -> Result<(), failure::Error> {
        let (header, ok, _) = parse(
            "ply\r\nformat ascii 1.0\r\ncomment hi\r\nelement v 1\r\nproperty int a\r\nend_header\r\n",
        )?;
        assert!(ok);
        assert_eq!(header.format(), Format::Ascii);
        assert_eq!(header.comments, ["hi"]);
        assert_eq!(header.elements[0].properties[0].name, "a");
        Ok(())
    }

    #[test]
    fn unknown_keyword_is_not_fatal() -> Result<(), failure::Error> {
        let (header, ok, _) = parse(
            "ply\nformat ascii 1.0\nfoo bar\nelement v 2\nproperty int a\nend_header\n",
        )?;
        assert!(!ok);
        assert_eq!(header.elements.len(), 1);
        assert_eq!(header.elements[0].size, 2);
        Ok(())
    }

    #[test]
    fn unknown_format_is_ascii() -> Result<(), failure::Error> {
        let (header, ok, _) = parse("ply\nformat binary_middle_endian 1.0\nend_header\n")?;
        assert!(ok);
        assert!(!header.is_binary);
        assert!(!header.is_big_endian);
        Ok(())
    }

    #[test]
    fn malformed() {
        fn is_malformed(src: &str) -> bool {
            match parse(src) {
                Err(Error::MalformedHeader { .. }) => true,
                _ => false,
            }
        }

        assert!(is_malformed("ply\nformat ascii 1.0\nproperty float x\nend_header\n"));
        assert!(is_malformed("ply\nelement v x\nend_header\n"));
        assert!(is_malformed("ply\nelement v\nend_header\n"));
        assert!(is_malformed("ply\nelement v 1\nproperty float128 x\nend_header\n"));
        assert!(is_malformed("ply\nelement v 1\nproperty list float int x\nend_header\n"));
        assert!(is_malformed("ply\nelement v 1\nproperty list uchar int\nend_header\n"));
        assert!(is_malformed("ply\nelement v 1\nproperty float x\n"));
        assert!(is_malformed(""));
    }

    #[test]
    fn write_header() -> Result<(), failure::Error> {
        let mut header = Header::new();
        header.set_format(Format::BinaryLittleEndian);
        header.comments.push("generated".into());
        header.obj_info.push("v1".into());
        let mut vertex = Element::new("vertex", 3);
        vertex.create_properties(&["x", "y"], ScalarType::Float32, None, 0)?;
        header.elements.push(vertex);
        let mut face = Element::new("face", 1);
        face.create_properties(
            &["vertex_indices"],
            ScalarType::Uint32,
            Some(ScalarType::Uint8),
            3,
        )?;
        header.elements.push(face);

        let mut out = Vec::new();
        header.write(&mut out)?;
        let expected = "ply\n\
            format binary_little_endian 1.0\n\
            comment generated\n\
            obj_info v1\n\
            element vertex 3\n\
            property float x\n\
            property float y\n\
            element face 1\n\
            property list uchar uint vertex_indices\n\
            end_header\n";
        assert_eq!(String::from_utf8(out)?, expected);

        // The written header parses back into the same structure (list counts
        // are not part of the header).
        let (parsed, ok, _) = parse(expected)?;
        assert!(ok);
        assert_eq!(parsed.comments, header.comments);
        assert_eq!(parsed.obj_info, header.obj_info);
        assert_eq!(parsed.elements[0], header.elements[0]);
        assert_eq!(parsed.elements[1].properties[0].list_type, Some(ScalarType::Uint8));

        Ok(())
    }

    #[test]
    fn create_properties_rejects_duplicates() {
        let mut elem = Element::new("vertex", 1);
        elem.create_properties(&["x"], ScalarType::Float32, None, 0).unwrap();

        assert!(elem.create_properties(&["y", "x"], ScalarType::Float32, None, 0).is_err());
        assert!(elem.create_properties(&["z", "z"], ScalarType::Float32, None, 0).is_err());
        assert_eq!(elem.properties.len(), 1);
    }

    #[test]
    fn report() -> Result<(), failure::Error> {
        let (header, _, _) = parse(
            "ply\nformat ascii 1.0\ncomment c\nelement face 2\n\
                property list uchar int idx\nend_header\n",
        )?;
        let mut out = Vec::new();
        header.report(&mut out)?;
        assert_eq!(
            String::from_utf8(out)?,
            "\t[ply_header] Type: ascii\n\
             \t[ply_header] Comment: c\n\
             \t[ply_header] element: face (2)\n\
             \t[ply_header] \tproperty: idx (type=int) (list_type=uchar)\n",
        );
        Ok(())
    }
}
