use crate::error::{Error, Result};
use mobj::{Binding, ObjectFile, Segment};
use std::path::Path;

/* Pretty-printer for object and executable files, one line per entry. */

pub fn dump_file<P: AsRef<Path>>(path: P) -> Result<()> {
    let object = mobj::read_file(&path).map_err(|err| Error::io(err, &path))?;
    print(&object);
    Ok(())
}

pub fn print(object: &ObjectFile) {
    let header = object.header();
    println!("text size: {}", header.text_size);
    println!("data size: {}", header.data_size);
    println!("entry: 0x{:08x}", header.entry);

    println!();
    for (index, word) in object.text.iter().enumerate() {
        println!("instruction {}: 0x{:08x}", index, word);
    }

    println!();
    for &byte in &object.data {
        let shown = if byte.is_ascii_graphic() || byte == b' ' {
            byte as char
        } else {
            '.'
        };
        println!("byte: 0x{:02x} ({})", byte, shown);
    }

    println!();
    for entry in object.relocations.iter() {
        let segment = match entry.segment {
            Segment::Text => ".text",
            Segment::Data => ".data",
            Segment::Undef => "undefined",
        };
        println!(
            "address at {}+0x{:x} needs relocation of type {:?} for symbol {}",
            segment, entry.target_offset, entry.kind, entry.dependency
        );
    }

    println!();
    for symbol in object.symbols.iter() {
        let binding = match symbol.binding {
            Binding::Local => "local",
            Binding::Global => "global",
        };
        match symbol.segment {
            Segment::Text => println!("{}: .text + {}, binding {}", symbol.name, symbol.offset, binding),
            Segment::Data => println!("{}: .data + {}, binding {}", symbol.name, symbol.offset, binding),
            Segment::Undef => println!("{}: undefined, binding {}", symbol.name, binding),
        }
    }
}
