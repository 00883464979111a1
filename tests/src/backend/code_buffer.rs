use mme_backend::code_buffer::CodeBuffer;

#[test]
fn test_emit_and_read() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u8(0x90); // NOP
    buf.emit_u32(0xDEADBEEF);
    assert_eq!(buf.offset(), 5);
    assert_eq!(buf.as_slice()[0], 0x90);
    assert_eq!(buf.read_u32(1), 0xDEADBEEF);
}

#[test]
fn test_patch() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    buf.emit_u32(0);
    buf.patch_u32(0, 0x12345678);
    assert_eq!(buf.read_u32(0), 0x12345678);
}

#[test]
fn test_permissions() {
    let buf = CodeBuffer::new(4096).unwrap();
    buf.set_executable().unwrap();
    buf.set_writable().unwrap();
}

#[test]
fn test_rounds_to_page() {
    let buf = CodeBuffer::new(1).unwrap();
    assert!(buf.capacity() >= 1);
    assert_eq!(buf.capacity() % 4096, 0);
    assert_eq!(buf.remaining(), buf.capacity());
}

#[test]
fn test_exhaustion_drops_writes() {
    let mut buf = CodeBuffer::new(4096).unwrap();
    let cap = buf.capacity();
    buf.emit_bytes(&vec![0xCC; cap - 2]);
    assert!(!buf.is_exhausted());

    // Does not fit: dropped whole, nothing partially written.
    buf.emit_u32(0x11223344);
    assert!(buf.is_exhausted());
    assert_eq!(buf.offset(), cap - 2);

    // Once exhausted, even writes that would fit are dropped.
    buf.emit_u8(0x90);
    assert_eq!(buf.offset(), cap - 2);
    assert_eq!(buf.remaining(), 2);
}
