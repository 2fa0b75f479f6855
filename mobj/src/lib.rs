//! The object file format produced by the assembler and consumed by the
//! linker, plus the executable image format (the same layout with the
//! header `entry` field populated and empty relocation and symbol tables).
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! Header    { text_size: u32, data_size: u32, entry: u32 }
//! text      [text_size bytes, one u32 per instruction]
//! data      [data_size bytes]
//! u32 relocation count, then per entry:
//!           { segment: u32, target_offset: u32, kind: u32, name: [u8; 32] }
//! u32 symbol count, then per symbol:
//!           { name: [u8; 32], offset: u32, binding: u32, segment: u32 }
//! ```
//!
//! Names are NUL-padded to 32 bytes.

mod relocs;
mod symbols;

#[cfg(test)]
mod test;

use byteorder::{ReadBytesExt, WriteBytesExt};
use num_traits::{FromPrimitive, ToPrimitive};
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::io::{BufReader, BufWriter};
use std::path::Path;

pub use relocs::{RelocEntry, RelocKind, RelocTable};
pub use symbols::{
    Binding, Segment, Symbol, SymbolError, SymbolTable, SYMBOL_NAME_SIZE, SYMBOL_TABLE_SIZE,
};

pub type Endian = byteorder::LittleEndian;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Header {
    pub text_size: u32,
    pub data_size: u32,
    pub entry: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ObjectFile {
    /// Execution start address; zero in relocatable objects, populated by
    /// the linker in executables.
    pub entry: u32,
    pub text: Vec<u32>,
    pub data: Vec<u8>,
    pub relocations: RelocTable,
    pub symbols: SymbolTable,
}

impl ObjectFile {
    pub fn new() -> ObjectFile {
        ObjectFile {
            entry: 0,
            text: Vec::new(),
            data: Vec::new(),
            relocations: RelocTable::new(),
            symbols: SymbolTable::new(),
        }
    }

    pub fn header(&self) -> Header {
        Header {
            text_size: (self.text.len() * 4) as u32,
            data_size: self.data.len() as u32,
            entry: self.entry,
        }
    }
}

impl Default for ObjectFile {
    fn default() -> ObjectFile {
        ObjectFile::new()
    }
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn enum_to_u32<T: ToPrimitive>(value: T) -> u32 {
    // Fieldless enums always convert.
    ToPrimitive::to_u32(&value).unwrap()
}

fn read_enum<T: FromPrimitive, R: Read>(reader: &mut R, what: &str) -> io::Result<T> {
    let value = reader.read_u32::<Endian>()?;
    T::from_u32(value).ok_or_else(|| invalid_data(format!("bad {} value {}", what, value)))
}

fn write_name<W: Write>(writer: &mut W, name: &str) -> io::Result<()> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() >= SYMBOL_NAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("name \"{}\" does not fit the name field", name),
        ));
    }
    let mut field = [0u8; SYMBOL_NAME_SIZE];
    field[..bytes.len()].copy_from_slice(bytes);
    writer.write_all(&field)
}

fn read_name<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut field = [0u8; SYMBOL_NAME_SIZE];
    reader.read_exact(&mut field)?;
    let len = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(SYMBOL_NAME_SIZE);
    String::from_utf8(field[..len].to_vec())
        .map_err(|_| invalid_data("name field is not valid UTF-8".to_owned()))
}

pub fn read<R: Read>(reader: &mut R) -> io::Result<ObjectFile> {
    let text_size = reader.read_u32::<Endian>()?;
    let data_size = reader.read_u32::<Endian>()?;
    let entry = reader.read_u32::<Endian>()?;

    if text_size % 4 != 0 {
        return Err(invalid_data(format!(
            "text size {} is not a multiple of 4",
            text_size
        )));
    }

    let mut text = Vec::with_capacity(text_size as usize / 4);
    for _ in 0..text_size / 4 {
        text.push(reader.read_u32::<Endian>()?);
    }

    let mut data = vec![0u8; data_size as usize];
    reader.read_exact(&mut data)?;

    let mut relocations = RelocTable::new();
    let reloc_count = reader.read_u32::<Endian>()?;
    for _ in 0..reloc_count {
        let segment = read_enum(reader, "relocation segment")?;
        let target_offset = reader.read_u32::<Endian>()?;
        let kind = read_enum(reader, "relocation kind")?;
        let dependency = read_name(reader)?;
        relocations.add(RelocEntry {
            segment,
            target_offset,
            kind,
            dependency,
        });
    }

    let mut symbols = SymbolTable::new();
    let symbol_count = reader.read_u32::<Endian>()?;
    for _ in 0..symbol_count {
        let name = read_name(reader)?;
        let offset = reader.read_u32::<Endian>()?;
        let binding = read_enum(reader, "symbol binding")?;
        let segment = read_enum(reader, "symbol segment")?;
        symbols
            .add_symbol(Symbol {
                name,
                offset,
                segment,
                binding,
            })
            .map_err(|err| invalid_data(format!("bad symbol table: {:?}", err)))?;
    }

    Ok(ObjectFile {
        entry,
        text,
        data,
        relocations,
        symbols,
    })
}

pub fn write<W: Write>(writer: &mut W, object: &ObjectFile) -> io::Result<()> {
    let header = object.header();
    writer.write_u32::<Endian>(header.text_size)?;
    writer.write_u32::<Endian>(header.data_size)?;
    writer.write_u32::<Endian>(header.entry)?;

    for &word in &object.text {
        writer.write_u32::<Endian>(word)?;
    }
    writer.write_all(&object.data)?;

    writer.write_u32::<Endian>(object.relocations.len() as u32)?;
    for entry in object.relocations.iter() {
        writer.write_u32::<Endian>(enum_to_u32(entry.segment))?;
        writer.write_u32::<Endian>(entry.target_offset)?;
        writer.write_u32::<Endian>(enum_to_u32(entry.kind))?;
        write_name(writer, &entry.dependency)?;
    }

    writer.write_u32::<Endian>(object.symbols.len() as u32)?;
    for symbol in object.symbols.iter() {
        write_name(writer, &symbol.name)?;
        writer.write_u32::<Endian>(symbol.offset)?;
        writer.write_u32::<Endian>(enum_to_u32(symbol.binding))?;
        writer.write_u32::<Endian>(enum_to_u32(symbol.segment))?;
    }

    Ok(())
}

pub trait ReadObjExt: Read + Sized {
    fn read_obj(&mut self) -> io::Result<ObjectFile> {
        read(self)
    }
}

impl<R: Read + Sized> ReadObjExt for R {}

pub trait WriteObjExt: Write + Sized {
    fn write_obj(&mut self, object: &ObjectFile) -> io::Result<()> {
        write(self, object)
    }
}

impl<W: Write + Sized> WriteObjExt for W {}

pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<ObjectFile> {
    BufReader::new(File::open(path)?).read_obj()
}

pub fn write_file<P: AsRef<Path>>(path: P, object: &ObjectFile) -> io::Result<()> {
    BufWriter::new(File::create(path)?).write_obj(object)
}
