use num_derive::{FromPrimitive, ToPrimitive};

/// Serialized symbol and relocation names occupy this many bytes,
/// NUL-padded; the longest representable name is one byte shorter.
pub const SYMBOL_NAME_SIZE: usize = 32;

/// Capacity of a [`SymbolTable`].
pub const SYMBOL_TABLE_SIZE: usize = 256;

const BUCKET_COUNT: usize = SYMBOL_TABLE_SIZE;

/// Which image a symbol or relocation target lives in. `Undef` marks a
/// symbol that is declared but not defined in this object.
#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Segment {
    Text,
    Data,
    Undef,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive, ToPrimitive)]
pub enum Binding {
    /// Private to the defining object.
    Local,
    /// Exported to the linker.
    Global,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Symbol {
    pub name: String,
    /// Offset relative to the start of the symbol's segment. The linker
    /// reuses this field for absolute addresses in its global table.
    pub offset: u32,
    pub segment: Segment,
    pub binding: Binding,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SymbolError {
    /// The name is already defined.
    Duplicate,
    /// The table holds [`SYMBOL_TABLE_SIZE`] symbols already.
    TableFull,
    /// Empty, or too long to serialize.
    InvalidName,
}

#[derive(Clone, Debug)]
struct Entry {
    symbol: Symbol,
    dead: bool,
}

/// Fixed-capacity symbol table, hashed by djb2 of the name with chained
/// buckets. Insertion order is preserved, which keeps serialization
/// deterministic. A second insertion under an existing name succeeds only
/// as an upgrade of an `Undef` entry to its definition.
#[derive(Clone, Debug)]
pub struct SymbolTable {
    buckets: Vec<Vec<usize>>,
    entries: Vec<Entry>,
    len: usize,
}

fn hash_key(key: &str) -> usize {
    let mut hash: u64 = 5381;
    for &byte in key.as_bytes() {
        hash = (hash << 5).wrapping_add(hash).wrapping_add(u64::from(byte));
    }
    (hash % BUCKET_COUNT as u64) as usize
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable {
            buckets: vec![Vec::new(); BUCKET_COUNT],
            entries: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn add(
        &mut self,
        name: &str,
        offset: u32,
        segment: Segment,
        binding: Binding,
    ) -> Result<(), SymbolError> {
        self.add_symbol(Symbol {
            name: name.to_owned(),
            offset,
            segment,
            binding,
        })
    }

    pub fn add_symbol(&mut self, symbol: Symbol) -> Result<(), SymbolError> {
        if symbol.name.is_empty() || symbol.name.len() >= SYMBOL_NAME_SIZE {
            return Err(SymbolError::InvalidName);
        }

        let bucket = hash_key(&symbol.name);
        for &index in &self.buckets[bucket] {
            let entry = &mut self.entries[index];
            if entry.dead || entry.symbol.name != symbol.name {
                continue;
            }
            if entry.symbol.segment == Segment::Undef {
                // Forward reference: upgrade to the definition. The
                // binding set at declaration time stays.
                entry.symbol.offset = symbol.offset;
                entry.symbol.segment = symbol.segment;
                return Ok(());
            }
            return Err(SymbolError::Duplicate);
        }

        if self.len >= SYMBOL_TABLE_SIZE {
            return Err(SymbolError::TableFull);
        }

        let index = self.entries.len();
        self.entries.push(Entry {
            symbol,
            dead: false,
        });
        self.buckets[bucket].push(index);
        self.len += 1;
        Ok(())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.buckets[hash_key(name)]
            .iter()
            .copied()
            .find(|&index| {
                let entry = &self.entries[index];
                !entry.dead && entry.symbol.name == name
            })
    }

    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.position(name).map(move |index| &self.entries[index].symbol)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Symbol> {
        let index = self.position(name)?;
        Some(&mut self.entries[index].symbol)
    }

    /// Tombstones the named symbol. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(index) => {
                self.entries[index].dead = true;
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Live symbols, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.entries
            .iter()
            .filter(|entry| !entry.dead)
            .map(|entry| &entry.symbol)
    }
}

impl Default for SymbolTable {
    fn default() -> SymbolTable {
        SymbolTable::new()
    }
}

impl PartialEq for SymbolTable {
    fn eq(&self, other: &SymbolTable) -> bool {
        self.iter().eq(other.iter())
    }
}
