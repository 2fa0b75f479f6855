use crate::error::{Error, ErrorKind, Result};
use byteorder::ByteOrder;
use mips::constants::{DATA_START, REGION_MASK, TEXT_START};
use mobj::{
    Binding, Endian, ObjectFile, RelocEntry, RelocKind, RelocTable, Segment, Symbol, SymbolTable,
};
use std::path::Path;

/* Linker

Lays the object files out in argument order (text segments first, then
data segments), builds a global table of exported symbols with their
final absolute addresses, resolves every relocation entry against the
local and global tables, and combines the patched segments into one
executable image.
*/

/// Object file name the runtime startup stub is loaded from when the
/// entry symbol is the literal `_start`.
pub const START_OBJECT: &str = "_start.o";

pub const START_SYMBOL: &str = "_start";

struct LinkFile {
    /// Display name for diagnostics.
    name: String,
    text_offset: u32,
    data_offset: u32,
    object: ObjectFile,
}

/// Links the given objects into an executable image. `entry_symbol`
/// selects the start address: `None` means the text base itself, the
/// literal `_start` additionally pulls in [`START_OBJECT`] after the
/// user's files.
pub fn link<P: AsRef<Path>>(object_paths: &[P], entry_symbol: Option<&str>) -> Result<ObjectFile> {
    let mut files = Vec::with_capacity(object_paths.len() + 1);
    let mut globals = SymbolTable::new();
    let mut text_size = 0u32;
    let mut data_size = 0u32;

    for path in object_paths {
        load_file(path.as_ref(), &mut files, &mut globals, &mut text_size, &mut data_size)?;
    }
    if entry_symbol == Some(START_SYMBOL) {
        load_file(
            Path::new(START_OBJECT),
            &mut files,
            &mut globals,
            &mut text_size,
            &mut data_size,
        )?;
    }

    for file in &mut files {
        file_relocation(file, &globals)?;
    }

    let entry = match entry_symbol {
        None => TEXT_START,
        Some(symbol) => {
            globals
                .get(symbol)
                .map(|s| s.offset)
                .ok_or_else(|| {
                    Error::new(ErrorKind::UnknownToken(symbol.to_owned())).with_context(format!(
                        "could not find entry symbol \"{}\"; have you exported it with .globl?",
                        symbol
                    ))
                })?
        }
    };

    // All text segments in file order, then all data segments.
    let mut text = Vec::with_capacity(text_size as usize / 4);
    let mut data = Vec::with_capacity(data_size as usize);
    for file in &files {
        text.extend_from_slice(&file.object.text);
    }
    for file in &files {
        data.extend_from_slice(&file.object.data);
    }

    Ok(ObjectFile {
        entry,
        text,
        data,
        relocations: RelocTable::new(),
        symbols: SymbolTable::new(),
    })
}

fn load_file(
    path: &Path,
    files: &mut Vec<LinkFile>,
    globals: &mut SymbolTable,
    text_size: &mut u32,
    data_size: &mut u32,
) -> Result<()> {
    let object = mobj::read_file(path).map_err(|err| Error::io(err, path))?;
    let text_offset = *text_size;
    let data_offset = *data_size;
    *text_size += object.header().text_size;
    *data_size += object.header().data_size;

    // Exported, defined symbols enter the global table with their final
    // absolute address.
    for symbol in object.symbols.iter() {
        if symbol.binding == Binding::Global && symbol.segment != Segment::Undef {
            let object_offset = match symbol.segment {
                Segment::Text => text_offset,
                _ => data_offset,
            };
            let address = final_address(symbol, object_offset);
            globals
                .add(&symbol.name, address, symbol.segment, Binding::Global)
                .map_err(|err| Error::from_symbol(err, &symbol.name).with_path(path))?;
        }
    }

    files.push(LinkFile {
        name: path.display().to_string(),
        text_offset,
        data_offset,
        object,
    });
    Ok(())
}

/// Final memory address of a symbol: segment base + object file offset +
/// symbol offset.
fn final_address(symbol: &Symbol, object_offset: u32) -> u32 {
    match symbol.segment {
        Segment::Text => TEXT_START + object_offset + symbol.offset,
        Segment::Data => DATA_START + object_offset + symbol.offset,
        Segment::Undef => 0,
    }
}

/// Resolves and applies every relocation entry of one file.
fn file_relocation(file: &mut LinkFile, globals: &SymbolTable) -> Result<()> {
    let text_offset = file.text_offset;
    let data_offset = file.data_offset;
    let name = &file.name;
    let object = &mut file.object;

    for entry in object.relocations.iter() {
        let dependency = object.symbols.get(&entry.dependency).ok_or_else(|| {
            Error::new(ErrorKind::UnknownToken(entry.dependency.clone()))
                .with_context(format!("error linking {}: symbol undefined", name))
        })?;

        let final_address = match dependency.segment {
            Segment::Text => final_address(dependency, text_offset),
            Segment::Data => final_address(dependency, data_offset),
            Segment::Undef => {
                if dependency.binding != Binding::Global {
                    return Err(Error::new(ErrorKind::UnknownToken(entry.dependency.clone()))
                        .with_context(format!("error linking {}: symbol undefined", name)));
                }
                let global = globals.get(&entry.dependency).ok_or_else(|| {
                    Error::new(ErrorKind::UnknownToken(entry.dependency.clone())).with_context(
                        format!(
                            "error linking {}: symbol undefined; have you exported it with .globl?",
                            name
                        ),
                    )
                })?;
                global.offset
            }
        };

        relocate(
            &mut object.text,
            &mut object.data,
            name,
            text_offset,
            entry,
            final_address,
        )?;
    }
    Ok(())
}

/// Applies one patch. Absolute kinds OR the address bits into fields the
/// assembler left zeroed, so re-applying a patch is idempotent.
fn relocate(
    text: &mut [u32],
    data: &mut [u8],
    file_name: &str,
    text_offset: u32,
    entry: &RelocEntry,
    final_address: u32,
) -> Result<()> {
    let instr_address = TEXT_START + text_offset + entry.target_offset;

    match entry.kind {
        RelocKind::R32 => {
            if entry.segment != Segment::Data {
                return Err(segment_error(file_name, entry, "data"));
            }
            let at = entry.target_offset as usize;
            if at + 4 > data.len() {
                return Err(Error::new(ErrorKind::InvalidArgs).with_context(format!(
                    "error linking {}: relocation target outside the data segment",
                    file_name
                )));
            }
            Endian::write_u32(&mut data[at..at + 4], final_address);
        }
        RelocKind::R26 => {
            let word = text_word(text, entry, file_name)?;
            if instr_address & REGION_MASK != final_address & REGION_MASK {
                return Err(Error::new(ErrorKind::Size(entry.dependency.clone()))
                    .with_context(format!("error linking {}: jump target out of range", file_name)));
            }
            *word |= (final_address & !REGION_MASK) >> 2;
        }
        RelocKind::Pc16 => {
            let word = text_word(text, entry, file_name)?;
            let distance =
                (i64::from(final_address) - (i64::from(instr_address) + 4)) / 4;
            if distance < i64::from(i16::min_value()) || distance > i64::from(i16::max_value()) {
                return Err(Error::new(ErrorKind::Size(entry.dependency.clone())).with_context(
                    format!("error linking {}: branch target out of range", file_name),
                ));
            }
            *word |= u32::from(distance as u16);
        }
        RelocKind::Hi16 => {
            *text_word(text, entry, file_name)? |= (final_address >> 16) & 0xFFFF;
        }
        RelocKind::Lo16 => {
            *text_word(text, entry, file_name)? |= final_address & 0xFFFF;
        }
    }
    Ok(())
}

/// The text word a TEXT-segment relocation patches; `target_offset` is a
/// byte offset, so the word index is `target_offset / 4`.
fn text_word<'a>(text: &'a mut [u32], entry: &RelocEntry, file_name: &str) -> Result<&'a mut u32> {
    if entry.segment != Segment::Text {
        return Err(segment_error(file_name, entry, "text"));
    }
    let index = (entry.target_offset / 4) as usize;
    text.get_mut(index).ok_or_else(|| {
        Error::new(ErrorKind::InvalidArgs).with_context(format!(
            "error linking {}: relocation target outside the text segment",
            file_name
        ))
    })
}

fn segment_error(file_name: &str, entry: &RelocEntry, wanted: &str) -> Error {
    Error::new(ErrorKind::InvalidArgs).with_context(format!(
        "error linking {}: attempted {:?} relocation outside the {} segment",
        file_name, entry.kind, wanted
    ))
}
