use super::*;

#[test]
fn bin_layout_is_little_endian_triplets() {
    let image = Image::from(vec![0x123456, 0x0000FF]);
    let mut out = Vec::new();

    write_bin(&mut out, &image).unwrap();

    assert_eq!(out, vec![0x56, 0x34, 0x12, 0xFF, 0x00, 0x00]);
}

#[test]
fn bin_write_read_masks_to_24_bits() {
    let image = Image::from(vec![0xFF123456, 0x000001, 0xFFFFFF]);
    let mut out = Vec::new();

    write_bin(&mut out, &image).unwrap();
    let read_back = read_bin(&mut &out[..]).unwrap();

    assert_eq!(read_back.words(), &[0x123456, 0x000001, 0xFFFFFF]);
}

#[test]
fn bin_rejects_truncated_input() {
    let err = read_bin(&mut &[0x12u8, 0x34][..]).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn hex_format_is_six_uppercase_digits_per_line() {
    let image = Image::from(vec![0x00ABCD, 0x000000, 0xFFFFFF]);
    let mut out = Vec::new();

    write_hex(&mut out, &image).unwrap();

    assert_eq!(String::from_utf8(out).unwrap(), "00ABCD\n000000\nFFFFFF\n");
}

#[test]
fn hex_write_read_round_trip() {
    let image = Image::from(vec![0x000001, 0x123456, 0xFFFFFF]);
    let mut out = Vec::new();

    write_hex(&mut out, &image).unwrap();
    let read_back = read_hex(&mut &out[..]).unwrap();

    assert_eq!(read_back, image);
}

#[test]
fn hex_rejects_wide_words() {
    let err = read_hex(&mut "1234567\n".as_bytes()).unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidData);
}

#[test]
fn file_round_trip() {
    let path = std::env::temp_dir().join("imgfile_round_trip.bin");

    let image = Image::from(vec![30, 27, 0x123456, 0xFFFFFF, 5]);
    write_bin_file(&path, &image).unwrap();
    let read_back = read_bin_file(&path).unwrap();

    assert_eq!(read_back, image);

    std::fs::remove_file(&path).unwrap();
}
