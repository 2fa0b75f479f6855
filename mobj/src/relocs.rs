use crate::symbols::Segment;
use num_derive::{FromPrimitive, ToPrimitive};

/// How the linker patches a relocation target once the final address of
/// the dependency symbol is known.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum RelocKind {
    /// Full 32-bit address, stored into four data bytes.
    R32,
    /// 26-bit pseudo-direct jump target field.
    R26,
    /// 16-bit PC-relative branch distance, in instructions.
    Pc16,
    /// High 16 bits of the address.
    Hi16,
    /// Low 16 bits of the address.
    Lo16,
}

/// "The word at `segment` + `target_offset` needs a `kind` relocation
/// against `dependency`."
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RelocEntry {
    pub segment: Segment,
    pub target_offset: u32,
    pub kind: RelocKind,
    pub dependency: String,
}

/// Relocation entries in the order pass 2 produced them. Append-only.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RelocTable {
    entries: Vec<RelocEntry>,
}

impl RelocTable {
    pub fn new() -> RelocTable {
        RelocTable::default()
    }

    pub fn add(&mut self, entry: RelocEntry) {
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelocEntry> {
        self.entries.iter()
    }
}
