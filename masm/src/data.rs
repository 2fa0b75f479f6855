use crate::error::{Error, ErrorKind, Result};
use crate::int_util;
use crate::lexer::{self, Immediate};
use crate::text::Line;
use byteorder::ByteOrder;
use matches::debug_assert_matches;
use mobj::{Endian, RelocEntry, RelocKind, RelocTable, Segment, SymbolTable};

/* Data segment builder

Parses the data directives into a list of typed items with a running byte
offset. Alignment padding becomes explicit `Space` items, so serializing
the image is a single sequential write. A symbol-valued `.word` stays
symbolic until pass 2, where it becomes four zero bytes and an `R32`
relocation.
*/

#[derive(Clone, Debug, PartialEq)]
pub enum DatumValue {
    Word(i32),
    Half(i16),
    Byte(i8),
    Str { bytes: Vec<u8>, terminated: bool },
    Space(u32),
    SymRef(String),
}

#[derive(Clone, Debug)]
pub struct Datum {
    pub value: DatumValue,
    pub size: u32,
    pub line: Line,
}

#[derive(Debug, Default)]
pub struct DataList {
    items: Vec<Datum>,
    offset: u32,
}

impl DataList {
    pub fn new() -> DataList {
        DataList::default()
    }

    /// Current size of the data image in bytes.
    pub fn size(&self) -> u32 {
        self.offset
    }

    pub fn items(&self) -> impl Iterator<Item = &Datum> {
        self.items.iter()
    }

    fn push(&mut self, value: DatumValue, size: u32, line: &Line) {
        self.items.push(Datum {
            value,
            size,
            line: line.clone(),
        });
        self.offset += size;
    }

    /// Handles one data directive (name given without the leading dot).
    pub fn directive(&mut self, name: &str, rest: &str, line: &Line) -> Result<()> {
        match name {
            "word" => self.int_list(rest, line, 4),
            "half" => self.int_list(rest, line, 2),
            "byte" => self.int_list(rest, line, 1),
            "ascii" => self.string(rest, line, false),
            "asciiz" => self.string(rest, line, true),
            "space" => self.space(rest, line),
            "align" => self.align(rest, line),
            _ => Err(Error::new(ErrorKind::UnknownToken(name.to_owned())).with_line(line)),
        }
    }

    fn int_list(&mut self, rest: &str, line: &Line, width: u32) -> Result<()> {
        let operands = lexer::split_operands(rest).map_err(|err| err.with_line(line))?;
        if operands.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArgs).with_line(line));
        }

        self.pad_to(width, line);
        for operand in &operands {
            let imm = lexer::parse_imm(operand).map_err(|err| err.with_line(line))?;
            let value = match (imm, width) {
                (Immediate::Symbol { name, .. }, 4) => DatumValue::SymRef(name),
                (Immediate::Int(v), 4) => DatumValue::Word(v),
                (Immediate::Int(v), 2) if v >= -0x8000 && v <= 0x7FFF => {
                    DatumValue::Half(v as i16)
                }
                (Immediate::Int(v), 1) if v >= -0x80 && v <= 0x7F => DatumValue::Byte(v as i8),
                _ => {
                    return Err(Error::new(ErrorKind::InvalidArg(operand.clone())).with_line(line))
                }
            };
            self.push(value, width, line);
        }
        Ok(())
    }

    fn string(&mut self, rest: &str, line: &Line, terminated: bool) -> Result<()> {
        let operands = lexer::split_operands(rest).map_err(|err| err.with_line(line))?;
        if operands.len() != 1 {
            return Err(Error::new(ErrorKind::InvalidArgs).with_line(line));
        }
        let token = &operands[0];
        if !token.starts_with('"') {
            return Err(Error::new(ErrorKind::InvalidArg(token.clone())).with_line(line));
        }
        let bytes = lexer::process_string(token)
            .ok_or_else(|| Error::new(ErrorKind::InvalidArg(token.clone())).with_line(line))?;
        let size = bytes.len() as u32 + terminated as u32;
        self.push(DatumValue::Str { bytes, terminated }, size, line);
        Ok(())
    }

    fn space(&mut self, rest: &str, line: &Line) -> Result<()> {
        let count = int_util::parse_int(rest.trim())
            .filter(|&n| n > 0)
            .ok_or_else(|| Error::new(ErrorKind::InvalidArg(rest.to_owned())).with_line(line))?;
        self.push(DatumValue::Space(count as u32), count as u32, line);
        Ok(())
    }

    fn align(&mut self, rest: &str, line: &Line) -> Result<()> {
        let exponent = int_util::parse_int(rest.trim())
            .filter(|&k| k >= 0 && k <= 3)
            .ok_or_else(|| Error::new(ErrorKind::InvalidArg(rest.to_owned())).with_line(line))?;
        self.pad_to(1 << exponent, line);
        Ok(())
    }

    /// Pads the image up to the next multiple of `boundary` with an
    /// explicit `Space` item; already-aligned cursors get nothing.
    fn pad_to(&mut self, boundary: u32, line: &Line) {
        let misalign = self.offset % boundary;
        if misalign != 0 {
            let bytes = boundary - misalign;
            self.push(DatumValue::Space(bytes), bytes, line);
        }
    }

    /// Serializes the data image, emitting an `R32` relocation for every
    /// symbol-valued word. Every referenced symbol must already be in the
    /// table (possibly as UNDEF).
    pub fn serialize(&self, symbols: &SymbolTable, relocs: &mut RelocTable) -> Result<Vec<u8>> {
        let mut image = Vec::with_capacity(self.offset as usize);
        for datum in &self.items {
            let at = image.len();
            match &datum.value {
                DatumValue::Word(value) => {
                    debug_assert_eq!(at % 4, 0);
                    image.resize(at + 4, 0);
                    Endian::write_i32(&mut image[at..], *value);
                }
                DatumValue::Half(value) => {
                    debug_assert_eq!(at % 2, 0);
                    image.resize(at + 2, 0);
                    Endian::write_i16(&mut image[at..], *value);
                }
                DatumValue::Byte(value) => image.push(*value as u8),
                DatumValue::Str { bytes, terminated } => {
                    image.extend_from_slice(bytes);
                    if *terminated {
                        image.push(0);
                    }
                }
                DatumValue::Space(count) => image.resize(at + *count as usize, 0),
                DatumValue::SymRef(name) => {
                    debug_assert_matches!(datum.size, 4);
                    if symbols.get(name).is_none() {
                        return Err(Error::new(ErrorKind::UnknownToken(name.clone()))
                            .with_line(&datum.line));
                    }
                    relocs.add(RelocEntry {
                        segment: Segment::Data,
                        target_offset: at as u32,
                        kind: RelocKind::R32,
                        dependency: name.clone(),
                    });
                    image.resize(at + 4, 0);
                }
            }
        }
        debug_assert_eq!(image.len() as u32, self.offset);
        Ok(image)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use matches::assert_matches;
    use mobj::{Binding, SymbolTable};

    fn line(text: &str) -> Line {
        Line::new("d.s", 1, text.to_owned())
    }

    fn build(directives: &[(&str, &str)]) -> DataList {
        let mut data = DataList::new();
        for (name, rest) in directives {
            data.directive(name, rest, &line(rest)).unwrap();
        }
        data
    }

    fn image(data: &DataList) -> Vec<u8> {
        let mut relocs = RelocTable::new();
        data.serialize(&SymbolTable::new(), &mut relocs).unwrap()
    }

    #[test]
    fn words_little_endian() {
        let data = build(&[("word", "0x11223344, -1")]);
        assert_eq!(
            image(&data),
            [0x44, 0x33, 0x22, 0x11, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn halves_and_bytes_range_checked() {
        let data = build(&[("half", "-1234"), ("byte", "-123")]);
        assert_eq!(image(&data), [0x2E, 0xFB, 0x85]);

        let mut bad = DataList::new();
        assert_matches!(bad.directive("byte", "128", &line("128")), Err(_));
        assert_matches!(bad.directive("half", "0x8000", &line("0x8000")), Err(_));
    }

    #[test]
    fn alignment_padding_is_explicit() {
        let data = build(&[("byte", "1"), ("half", "2"), ("byte", "3"), ("word", "4")]);
        // byte, pad, half, byte, pad×3, word
        assert_eq!(data.size(), 12);
        assert_eq!(
            image(&data),
            [1, 0, 2, 0, 3, 0, 0, 0, 4, 0, 0, 0]
        );
    }

    #[test]
    fn align_directive() {
        let data = build(&[("byte", "1"), ("align", "2"), ("byte", "2")]);
        assert_eq!(image(&data), [1, 0, 0, 0, 2]);

        // Aligned cursor: no padding at all.
        let data = build(&[("word", "1"), ("word", "2"), ("align", "3"), ("word", "3")]);
        assert_eq!(data.size(), 12);

        let mut bad = DataList::new();
        assert_matches!(bad.directive("align", "4", &line("4")), Err(_));
    }

    #[test]
    fn strings() {
        let data = build(&[("ascii", "\"hi\""), ("asciiz", "\"ok\"")]);
        assert_eq!(image(&data), [b'h', b'i', b'o', b'k', 0]);

        let empty_z = build(&[("asciiz", "\"\"")]);
        assert_eq!(image(&empty_z), [0]);
        let empty = build(&[("ascii", "\"\"")]);
        assert_eq!(image(&empty), Vec::<u8>::new());
    }

    #[test]
    fn string_escapes() {
        let data = build(&[("asciiz", "\"a\\tb\\n\"")]);
        assert_eq!(image(&data), [b'a', b'\t', b'b', b'\n', 0]);
    }

    #[test]
    fn space_directive() {
        let data = build(&[("space", "3")]);
        assert_eq!(image(&data), [0, 0, 0]);

        let mut bad = DataList::new();
        assert_matches!(bad.directive("space", "0", &line("0")), Err(_));
        assert_matches!(bad.directive("space", "-4", &line("-4")), Err(_));
    }

    #[test]
    fn symbol_word_emits_relocation() {
        let mut data = DataList::new();
        data.directive("word", "target", &line("target")).unwrap();

        let mut symbols = SymbolTable::new();
        symbols
            .add("target", 0, Segment::Text, Binding::Local)
            .unwrap();
        let mut relocs = RelocTable::new();
        let image = data.serialize(&symbols, &mut relocs).unwrap();

        assert_eq!(image, [0, 0, 0, 0]);
        assert_eq!(relocs.len(), 1);
        let entry = relocs.iter().next().unwrap();
        assert_eq!(entry.segment, Segment::Data);
        assert_eq!(entry.target_offset, 0);
        assert_eq!(entry.kind, RelocKind::R32);
        assert_eq!(entry.dependency, "target");
    }

    #[test]
    fn symbol_word_requires_known_symbol() {
        let mut data = DataList::new();
        data.directive("word", "nowhere", &line("nowhere")).unwrap();
        let mut relocs = RelocTable::new();
        assert_matches!(
            data.serialize(&SymbolTable::new(), &mut relocs),
            Err(Error {
                kind: ErrorKind::UnknownToken(_),
                ..
            })
        );
    }

    #[test]
    fn symbols_rejected_in_narrow_directives() {
        let mut data = DataList::new();
        assert_matches!(data.directive("half", "label", &line("label")), Err(_));
        assert_matches!(data.directive("byte", "label", &line("label")), Err(_));
    }

    #[test]
    fn unknown_directive() {
        let mut data = DataList::new();
        assert_matches!(
            data.directive("double", "1.0", &line("1.0")),
            Err(Error {
                kind: ErrorKind::UnknownToken(_),
                ..
            })
        );
    }
}
