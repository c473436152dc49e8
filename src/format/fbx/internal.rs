use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use anyhow::{bail, Context, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, LE};
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

const MAGIC: &[u8; 23] = b"Kaydara FBX Binary  \x00\x1a\x00";
const FOOTER_ID: [u8; 16] = [
    0xfa, 0xbc, 0xab, 0x09, 0xd0, 0xc8, 0xd4, 0x66, 0xb1, 0x76, 0xfb, 0x83, 0x1c, 0xf7, 0x26, 0x7e,
];
const FOOTER_MAGIC: [u8; 16] = [
    0xf8, 0x5a, 0x8c, 0x6a, 0xde, 0xf5, 0xd9, 0x7e, 0xec, 0xe9, 0x0c, 0xe3, 0x75, 0x8f, 0x29, 0x0b,
];
/// Files from this version on use 64-bit record offsets.
const WIDE_OFFSETS_VERSION: u32 = 7500;
/// Arrays whose payload is at least this many bytes are written zlib-compressed.
const COMPRESSION_THRESHOLD: usize = 128;
/// How deep records may nest. Real files stay within a handful of levels.
const MAX_DEPTH: usize = 64;
/// The largest expansion a deflate stream can produce from one input byte.
const MAX_DEFLATE_RATIO: usize = 1032;

/// Separates the object name from its class in FBX name strings (e.g. "Hips\0\x01Model").
pub const NAME_SEPARATOR: &[u8] = b"\x00\x01";

/// Represents a binary FBX file as a tree of named records. Nothing is interpreted at this
/// level; the importer and exporter give meaning to the records they care about and carry the
/// rest through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// The file version from the header (e.g. 7400 for FBX 2014).
    pub version: u32,
    /// The top-level records (`FBXHeaderExtension`, `GlobalSettings`, `Objects`, ...).
    pub records: Vec<Record>,
}

impl Document {
    pub fn new(version: u32) -> Self {
        Self {
            version,
            records: Vec::new(),
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MAGIC.len() + 4 || &bytes[..MAGIC.len()] != MAGIC {
            bail!("Not a binary FBX file (ASCII FBX is not supported)");
        }

        let mut reader = Cursor::new(bytes);
        reader.seek(SeekFrom::Start(MAGIC.len() as u64))?;
        let version = reader.read_u32::<LE>()?;
        let wide = version >= WIDE_OFFSETS_VERSION;

        let mut document = Self::new(version);
        // Some writers omit the top-level null record, so stop when no header fits anymore.
        while reader.position() as usize + record_header_len(wide) <= bytes.len() {
            match Record::from_reader(&mut reader, wide, 0)? {
                Some(record) => document.records.push(record),
                None => break,
            }
        }

        Ok(document)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let wide = self.version >= WIDE_OFFSETS_VERSION;
        let mut writer = Cursor::new(Vec::new());

        writer.write_all(MAGIC)?;
        writer.write_u32::<LE>(self.version)?;
        for record in &self.records {
            record.to_writer(&mut writer, wide)?;
        }
        write_null_record(&mut writer, wide)?;

        writer.write_all(&FOOTER_ID)?;
        writer.write_all(&[0; 4])?;
        // The footer version is aligned to 16 bytes, with at least some padding.
        let offset = writer.position() as usize;
        let padding = match ((offset + 15) & !15) - offset {
            0 => 16,
            padding => padding,
        };
        writer.write_all(&vec![0; padding])?;
        writer.write_u32::<LE>(self.version)?;
        writer.write_all(&[0; 120])?;
        writer.write_all(&FOOTER_MAGIC)?;

        Ok(writer.into_inner())
    }

    /// Returns the first top-level record with the given name.
    pub fn find(&self, name: &str) -> Option<&Record> {
        self.records.iter().find(|record| record.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.records.iter_mut().find(|record| record.name == name)
    }

    /// Returns the top-level record with the given name, appending an empty one if missing.
    pub fn find_or_insert(&mut self, name: &str) -> &mut Record {
        let index = match self.records.iter().position(|record| record.name == name) {
            Some(index) => index,
            None => {
                self.records.push(Record::new(name, Vec::new(), Vec::new()));
                self.records.len() - 1
            }
        };
        &mut self.records[index]
    }

    /// Returns the largest object id in the `Objects` section, if any.
    pub fn max_object_id(&self) -> Option<i64> {
        self.find("Objects")?
            .children
            .iter()
            .filter_map(Record::object_id)
            .max()
    }
}

/// A named node of the FBX record tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub name: String,
    pub properties: Vec<Property>,
    pub children: Vec<Record>,
}

impl Record {
    pub fn new(name: &str, properties: Vec<Property>, children: Vec<Record>) -> Self {
        Self {
            name: name.to_string(),
            properties,
            children,
        }
    }

    /// Reads a record, returning `None` when the null record that closes a list is found.
    fn from_reader(reader: &mut Cursor<&[u8]>, wide: bool, depth: usize) -> Result<Option<Self>> {
        if depth > MAX_DEPTH {
            bail!("Records are nested more than {} levels deep", MAX_DEPTH);
        }

        let start = reader.position();
        let end_offset = read_offset(reader, wide)?;
        let num_properties = read_offset(reader, wide)?;
        let _property_list_len = read_offset(reader, wide)?;
        let name_len = reader.read_u8()?;

        if end_offset == 0 {
            return Ok(None);
        }
        if end_offset <= start || end_offset > reader.get_ref().len() as u64 {
            bail!("Record at offset {} has an invalid end offset {}", start, end_offset);
        }

        let mut name = vec![0; name_len as usize];
        reader.read_exact(&mut name)?;
        let name = String::from_utf8_lossy(&name).into_owned();

        let mut properties = Vec::new();
        for _ in 0..num_properties {
            let property = Property::from_reader(reader)
                .with_context(|| format!("Failed to read a property of \"{}\"", name))?;
            properties.push(property);
        }

        let mut children = Vec::new();
        while reader.position() < end_offset {
            match Self::from_reader(reader, wide, depth + 1)? {
                Some(child) => children.push(child),
                None => break,
            }
        }

        if reader.position() != end_offset {
            bail!(
                "Record \"{}\" ends at offset {} but its header claims {}",
                name,
                reader.position(),
                end_offset
            );
        }

        Ok(Some(Self {
            name,
            properties,
            children,
        }))
    }

    fn to_writer(&self, writer: &mut Cursor<Vec<u8>>, wide: bool) -> Result<()> {
        if self.name.len() > u8::MAX as usize {
            bail!("Record name \"{}\" is too long", self.name);
        }

        let header = writer.position();
        // The end offset and the property list length are patched once known.
        write_offset(writer, wide, 0)?;
        write_offset(writer, wide, self.properties.len() as u64)?;
        write_offset(writer, wide, 0)?;
        writer.write_u8(self.name.len() as u8)?;
        writer.write_all(self.name.as_bytes())?;

        let properties_start = writer.position();
        for property in &self.properties {
            property.to_writer(writer)?;
        }
        let properties_len = writer.position() - properties_start;

        if !self.children.is_empty() || self.properties.is_empty() {
            for child in &self.children {
                child.to_writer(writer, wide)?;
            }
            write_null_record(writer, wide)?;
        }

        let end = writer.position();
        writer.seek(SeekFrom::Start(header))?;
        write_offset(writer, wide, end)?;
        writer.seek(SeekFrom::Current(offset_len(wide) as i64))?;
        write_offset(writer, wide, properties_len)?;
        writer.seek(SeekFrom::Start(end))?;

        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Record> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.children.iter_mut().find(|child| child.name == name)
    }

    /// The id of an object record (the first property of every record under `Objects`).
    pub fn object_id(&self) -> Option<i64> {
        self.properties.first().and_then(Property::as_i64)
    }

    /// The object name, without the class suffix (e.g. "Hips" for "Hips\0\x01Model").
    pub fn object_name(&self) -> Option<&str> {
        self.properties.get(1).and_then(Property::as_str).map(strip_class)
    }

    /// The object subclass (e.g. "LimbNode" for joints, "Mesh" for geometry).
    pub fn object_kind(&self) -> Option<&str> {
        self.properties.get(2).and_then(Property::as_str)
    }

    /// Returns the `P` entry with the given name from the `Properties70` child.
    pub fn property70(&self, name: &str) -> Option<&Record> {
        self.find("Properties70")?
            .children
            .iter()
            .find(|p| p.properties.first().and_then(Property::as_str) == Some(name))
    }

    pub fn property70_mut(&mut self, name: &str) -> Option<&mut Record> {
        self.find_mut("Properties70")?
            .children
            .iter_mut()
            .find(|p| p.properties.first().and_then(Property::as_str) == Some(name))
    }

    /// Sets (or inserts) a `P` entry in the `Properties70` child. The first four properties of
    /// the entry are the name, the type, the label and the flags.
    pub fn set_property70(&mut self, entry: Vec<Property>) {
        let name = entry.first().and_then(Property::as_str).map(str::to_string);
        let index = match self.children.iter().position(|c| c.name == "Properties70") {
            Some(index) => index,
            None => {
                self.children
                    .push(Record::new("Properties70", Vec::new(), Vec::new()));
                self.children.len() - 1
            }
        };
        let properties70 = &mut self.children[index];

        let existing = properties70
            .children
            .iter_mut()
            .find(|p| p.properties.first().and_then(Property::as_str) == name.as_deref());
        match existing {
            Some(p) => p.properties = entry,
            None => properties70.children.push(Record::new("P", entry, Vec::new())),
        }
    }
}

/// A typed value attached to a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    /// An `S` value that isn't valid UTF-8, kept byte for byte.
    ByteString(Vec<u8>),
    Raw(Vec<u8>),
    BoolArray(Vec<bool>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
    F64Array(Vec<f64>),
}

impl Property {
    pub fn string(value: &str) -> Self {
        Self::String(value.to_string())
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I16(value) => Some(value as i64),
            Self::I32(value) => Some(value as i64),
            Self::I64(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::F32(value) => Some(value as f64),
            Self::F64(value) => Some(value),
            Self::I16(value) => Some(value as f64),
            Self::I32(value) => Some(value as f64),
            Self::I64(value) => Some(value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    fn from_reader(reader: &mut Cursor<&[u8]>) -> Result<Self> {
        let code = reader.read_u8()?;
        let property = match code {
            b'C' => Self::Bool(reader.read_u8()? != 0),
            b'Y' => Self::I16(reader.read_i16::<LE>()?),
            b'I' => Self::I32(reader.read_i32::<LE>()?),
            b'L' => Self::I64(reader.read_i64::<LE>()?),
            b'F' => Self::F32(reader.read_f32::<LE>()?),
            b'D' => Self::F64(reader.read_f64::<LE>()?),
            b'S' => match String::from_utf8(read_bytes(reader)?) {
                Ok(value) => Self::String(value),
                Err(error) => Self::ByteString(error.into_bytes()),
            },
            b'R' => Self::Raw(read_bytes(reader)?),
            b'b' => Self::BoolArray(read_array(reader, 1)?.iter().map(|&b| b != 0).collect()),
            b'i' => {
                let data = read_array(reader, 4)?;
                let mut values = vec![0; data.len() / 4];
                (&data[..]).read_i32_into::<LE>(&mut values)?;
                Self::I32Array(values)
            }
            b'l' => {
                let data = read_array(reader, 8)?;
                let mut values = vec![0; data.len() / 8];
                (&data[..]).read_i64_into::<LE>(&mut values)?;
                Self::I64Array(values)
            }
            b'f' => {
                let data = read_array(reader, 4)?;
                let mut values = vec![0.; data.len() / 4];
                (&data[..]).read_f32_into::<LE>(&mut values)?;
                Self::F32Array(values)
            }
            b'd' => {
                let data = read_array(reader, 8)?;
                let mut values = vec![0.; data.len() / 8];
                (&data[..]).read_f64_into::<LE>(&mut values)?;
                Self::F64Array(values)
            }
            code => bail!("Unknown property type code 0x{:02x}", code),
        };

        Ok(property)
    }

    fn to_writer(&self, writer: &mut Cursor<Vec<u8>>) -> Result<()> {
        match self {
            Self::Bool(value) => {
                writer.write_u8(b'C')?;
                writer.write_u8(*value as u8)?;
            }
            Self::I16(value) => {
                writer.write_u8(b'Y')?;
                writer.write_i16::<LE>(*value)?;
            }
            Self::I32(value) => {
                writer.write_u8(b'I')?;
                writer.write_i32::<LE>(*value)?;
            }
            Self::I64(value) => {
                writer.write_u8(b'L')?;
                writer.write_i64::<LE>(*value)?;
            }
            Self::F32(value) => {
                writer.write_u8(b'F')?;
                writer.write_f32::<LE>(*value)?;
            }
            Self::F64(value) => {
                writer.write_u8(b'D')?;
                writer.write_f64::<LE>(*value)?;
            }
            Self::String(value) => {
                writer.write_u8(b'S')?;
                write_bytes(writer, value.as_bytes())?;
            }
            Self::ByteString(value) => {
                writer.write_u8(b'S')?;
                write_bytes(writer, value)?;
            }
            Self::Raw(value) => {
                writer.write_u8(b'R')?;
                write_bytes(writer, value)?;
            }
            Self::BoolArray(values) => {
                let data: Vec<u8> = values.iter().map(|&value| value as u8).collect();
                write_array(writer, b'b', values.len(), &data)?;
            }
            Self::I32Array(values) => {
                let mut data = Vec::with_capacity(values.len() * 4);
                for &value in values {
                    data.write_i32::<LE>(value)?;
                }
                write_array(writer, b'i', values.len(), &data)?;
            }
            Self::I64Array(values) => {
                let mut data = Vec::with_capacity(values.len() * 8);
                for &value in values {
                    data.write_i64::<LE>(value)?;
                }
                write_array(writer, b'l', values.len(), &data)?;
            }
            Self::F32Array(values) => {
                let mut data = Vec::with_capacity(values.len() * 4);
                for &value in values {
                    data.write_f32::<LE>(value)?;
                }
                write_array(writer, b'f', values.len(), &data)?;
            }
            Self::F64Array(values) => {
                let mut data = Vec::with_capacity(values.len() * 8);
                for &value in values {
                    data.write_f64::<LE>(value)?;
                }
                write_array(writer, b'd', values.len(), &data)?;
            }
        }

        Ok(())
    }
}

/// Removes the class suffix from an FBX name string.
pub fn strip_class(name: &str) -> &str {
    match memchr::memmem::find(name.as_bytes(), NAME_SEPARATOR) {
        Some(index) => &name[..index],
        None => name,
    }
}

/// Builds an FBX name string from an object name and its class.
pub fn class_name(name: &str, class: &str) -> String {
    format!("{}\x00\x01{}", name, class)
}

fn offset_len(wide: bool) -> usize {
    if wide {
        8
    } else {
        4
    }
}

fn record_header_len(wide: bool) -> usize {
    offset_len(wide) * 3 + 1
}

fn read_offset(reader: &mut Cursor<&[u8]>, wide: bool) -> Result<u64> {
    if wide {
        Ok(reader.read_u64::<LE>()?)
    } else {
        Ok(reader.read_u32::<LE>()? as u64)
    }
}

fn write_offset(writer: &mut Cursor<Vec<u8>>, wide: bool, value: u64) -> Result<()> {
    if wide {
        writer.write_u64::<LE>(value)?;
    } else {
        let value = u32::try_from(value).context("The file is too large for 32-bit offsets")?;
        writer.write_u32::<LE>(value)?;
    }

    Ok(())
}

fn write_null_record(writer: &mut Cursor<Vec<u8>>, wide: bool) -> Result<()> {
    writer.write_all(&vec![0; record_header_len(wide)])?;
    Ok(())
}

fn remaining(reader: &Cursor<&[u8]>) -> usize {
    reader.get_ref().len().saturating_sub(reader.position() as usize)
}

fn read_bytes(reader: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LE>()? as usize;
    if len > remaining(reader) {
        bail!("A string of {} bytes overruns the file", len);
    }

    let mut bytes = vec![0; len];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

fn write_bytes(writer: &mut Cursor<Vec<u8>>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).context("A string is too long")?;
    writer.write_u32::<LE>(len)?;
    writer.write_all(bytes)?;
    Ok(())
}

/// Reads the payload of an array property, decompressing it if needed.
fn read_array(reader: &mut Cursor<&[u8]>, element_size: usize) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LE>()? as usize;
    let encoding = reader.read_u32::<LE>()?;
    let stored_len = reader.read_u32::<LE>()? as usize;
    if stored_len > remaining(reader) {
        bail!("An array of {} bytes overruns the file", stored_len);
    }

    let expected = len
        .checked_mul(element_size)
        .filter(|&expected| expected <= stored_len.saturating_mul(MAX_DEFLATE_RATIO))
        .with_context(|| {
            format!("An array of {} elements can't fit in {} bytes", len, stored_len)
        })?;

    let mut stored = vec![0; stored_len];
    reader.read_exact(&mut stored)?;

    let data = match encoding {
        0 => stored,
        1 => {
            let mut data = Vec::new();
            ZlibDecoder::new(&stored[..])
                .take(expected as u64 + 1)
                .read_to_end(&mut data)
                .context("Failed to decompress an array property")?;
            data
        }
        encoding => bail!("Unknown array encoding {}", encoding),
    };

    if data.len() != expected {
        bail!(
            "Array holds {} bytes but {} elements of {} bytes were declared",
            data.len(),
            len,
            element_size
        );
    }

    Ok(data)
}

fn write_array(writer: &mut Cursor<Vec<u8>>, code: u8, len: usize, data: &[u8]) -> Result<()> {
    writer.write_u8(code)?;
    writer.write_u32::<LE>(len as u32)?;

    if data.len() >= COMPRESSION_THRESHOLD {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        let compressed = encoder.finish()?;

        writer.write_u32::<LE>(1)?;
        writer.write_u32::<LE>(compressed.len() as u32)?;
        writer.write_all(&compressed)?;
    } else {
        writer.write_u32::<LE>(0)?;
        writer.write_u32::<LE>(data.len() as u32)?;
        writer.write_all(data)?;
    }

    Ok(())
}
