use super::*;

fn sample_object() -> ObjectFile {
    let mut object = ObjectFile::new();
    object.text = vec![0x3C01_1001, 0x3428_0000, 0x0C10_0000, 0x0000_000C];
    object.data = vec![b'h', b'i', 0, 0xFF];

    object.relocations.add(RelocEntry {
        segment: Segment::Text,
        target_offset: 0,
        kind: RelocKind::Hi16,
        dependency: "msg".to_owned(),
    });
    object.relocations.add(RelocEntry {
        segment: Segment::Text,
        target_offset: 8,
        kind: RelocKind::R26,
        dependency: "helper".to_owned(),
    });
    object.relocations.add(RelocEntry {
        segment: Segment::Data,
        target_offset: 0,
        kind: RelocKind::R32,
        dependency: "msg".to_owned(),
    });

    object
        .symbols
        .add("msg", 0, Segment::Data, Binding::Local)
        .unwrap();
    object
        .symbols
        .add("main", 0, Segment::Text, Binding::Global)
        .unwrap();
    object
        .symbols
        .add("helper", 0, Segment::Undef, Binding::Global)
        .unwrap();

    object
}

#[test]
fn write_read() {
    let object = sample_object();

    let mut bytes = Vec::new();
    write(&mut bytes, &object).unwrap();
    let read_back = read(&mut &bytes[..]).unwrap();

    assert_eq!(object, read_back);
}

#[test]
fn write_read_file() {
    let path = std::env::temp_dir().join("mobj_write_read_file.o");
    let object = sample_object();

    write_file(&path, &object).unwrap();
    let read_back = read_file(&path).unwrap();

    assert_eq!(object, read_back);

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn layout_is_fixed() {
    let mut object = ObjectFile::new();
    object.entry = 0x0040_0000;
    object.text = vec![0x2408_002A];
    object.data = vec![1, 2, 3];

    let mut bytes = Vec::new();
    write(&mut bytes, &object).unwrap();

    // Header, one text word, three data bytes, two zero counts.
    assert_eq!(bytes.len(), 12 + 4 + 3 + 4 + 4);
    assert_eq!(&bytes[0..4], &[4, 0, 0, 0]);
    assert_eq!(&bytes[4..8], &[3, 0, 0, 0]);
    assert_eq!(&bytes[8..12], &[0, 0, 0x40, 0]);
    assert_eq!(&bytes[12..16], &[0x2A, 0, 0x08, 0x24]);
    assert_eq!(&bytes[16..19], &[1, 2, 3]);
    assert_eq!(&bytes[19..], &[0u8; 8][..]);
}

#[test]
fn reloc_entry_layout() {
    let mut object = ObjectFile::new();
    object.relocations.add(RelocEntry {
        segment: Segment::Data,
        target_offset: 0x10,
        kind: RelocKind::R32,
        dependency: "x".to_owned(),
    });

    let mut bytes = Vec::new();
    write(&mut bytes, &object).unwrap();

    let entry = &bytes[16..16 + 44];
    assert_eq!(&entry[0..4], &[1, 0, 0, 0]); // segment = Data
    assert_eq!(&entry[4..8], &[0x10, 0, 0, 0]);
    assert_eq!(&entry[8..12], &[0, 0, 0, 0]); // kind = R32
    assert_eq!(entry[12], b'x');
    assert!(entry[13..].iter().all(|&b| b == 0));
}

#[test]
fn rejects_bad_enum_values() {
    let object = sample_object();
    let mut bytes = Vec::new();
    write(&mut bytes, &object).unwrap();

    // Corrupt the first relocation's segment word.
    let reloc_start = 12 + object.text.len() * 4 + object.data.len() + 4;
    bytes[reloc_start] = 9;
    let err = read(&mut &bytes[..]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn rejects_ragged_text_size() {
    let mut bytes = Vec::new();
    write(&mut bytes, &ObjectFile::new()).unwrap();
    bytes[0] = 3; // text_size not a multiple of 4
    let err = read(&mut &bytes[..]).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn rejects_oversized_name() {
    let mut object = ObjectFile::new();
    object.relocations.add(RelocEntry {
        segment: Segment::Text,
        target_offset: 0,
        kind: RelocKind::Pc16,
        dependency: "n".repeat(SYMBOL_NAME_SIZE),
    });
    let mut bytes = Vec::new();
    let err = write(&mut bytes, &object).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
}
