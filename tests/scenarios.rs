use std::io::Cursor;

use unpak::{Compression, Error, OodleAdapter, PakBuilder, Result};

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[test]
fn s2_compressed_entry_splits_into_expected_block_count() {
    init_log();
    let mut pak = PakBuilder::new().create("../../../TestGame/", Compression::Zlib);
    let payload = vec![0x41u8; 100_000];
    pak.add_entry("Content/Big.uasset", payload.clone()).unwrap();

    let mut buf = Cursor::new(Vec::new());
    pak.save::<Cursor<Vec<u8>>, _>(&mut buf, None).unwrap();

    buf.set_position(0);
    let mounted = PakBuilder::new().mount(&mut buf).unwrap();
    let data = mounted
        .read_entry("TestGame/Content/Big.uasset", &mut buf)
        .unwrap();
    assert_eq!(data, payload);
}

#[test]
fn s3_asset_triple_groups_export_and_bulk() {
    init_log();
    let mut pak = PakBuilder::new().create("../../../TestGame/", Compression::None);
    pak.add_entry("Content/M.uasset", vec![1]).unwrap();
    pak.add_entry("Content/M.uexp", vec![2]).unwrap();
    pak.add_entry("Content/M.ubulk", vec![3]).unwrap();

    let mut buf = Cursor::new(Vec::new());
    pak.save::<Cursor<Vec<u8>>, _>(&mut buf, None).unwrap();

    buf.set_position(0);
    let mounted = PakBuilder::new().mount(&mut buf).unwrap();
    let asset = mounted
        .get_asset("TestGame/Content/M.uasset", &mut buf)
        .unwrap();
    assert_eq!(asset.main, vec![1]);
    assert_eq!(asset.export, Some(vec![2]));
    assert_eq!(asset.bulk, Some(vec![3]));
}

#[test]
fn s4_encrypted_guid_is_rejected() {
    init_log();
    // a footer whose encryption guid is non-zero must be rejected outright,
    // since this crate never supports encrypted archives.
    let mut bytes = vec![0u8; 221];
    bytes[0] = 1; // non-zero guid byte
    let mut buf = Cursor::new(bytes);
    let result = PakBuilder::new().mount(&mut buf);
    assert!(result.is_err());
}

#[test]
fn s5_bad_magic_is_rejected() {
    init_log();
    let mut pak = PakBuilder::new().create("../../../TestGame/", Compression::None);
    pak.add_entry("Content/A.uasset", vec![1, 2, 3]).unwrap();
    let mut buf = Cursor::new(Vec::new());
    pak.save::<Cursor<Vec<u8>>, _>(&mut buf, None).unwrap();

    // corrupt the magic word, which lives 205 bytes before EOF (17 bytes
    // into the 221-byte footer).
    let len = buf.get_ref().len();
    buf.get_mut()[len - 221 + 17] ^= 0xFF;

    buf.set_position(0);
    let result = PakBuilder::new().mount(&mut buf);
    assert!(matches!(result, Err(Error::Magic(_))));
}

#[test]
fn s6_empty_archive_has_221_byte_footer() {
    init_log();
    let mut pak = PakBuilder::new().create("../../../TestGame/", Compression::None);
    let mut buf = Cursor::new(Vec::new());
    pak.save::<Cursor<Vec<u8>>, _>(&mut buf, None).unwrap();

    let len = buf.get_ref().len() as u64;
    buf.set_position(0);
    let mounted = PakBuilder::new().mount(&mut buf).unwrap();
    assert_eq!(mounted.entries().count(), 0);
    assert!(len >= 221);
}

struct XorAdapter(u8);
impl OodleAdapter for XorAdapter {
    fn decompress(&self, compressed: &[u8], uncompressed: &mut [u8]) -> Result<()> {
        for (dst, src) in uncompressed.iter_mut().zip(compressed) {
            *dst = src ^ self.0;
        }
        Ok(())
    }
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ self.0).collect())
    }
}

#[test]
fn oodle_entries_round_trip_through_injected_adapter() {
    init_log();
    let mut pak = PakBuilder::new()
        .oodle(Box::new(XorAdapter(0x42)))
        .create("../../../TestGame/", Compression::Oodle);
    let payload = b"oodle-backed payload".to_vec();
    pak.add_entry("Content/Packed.uasset", payload.clone())
        .unwrap();

    let mut buf = Cursor::new(Vec::new());
    pak.save::<Cursor<Vec<u8>>, _>(&mut buf, None).unwrap();

    buf.set_position(0);
    let mounted = PakBuilder::new()
        .oodle(Box::new(XorAdapter(0x42)))
        .mount(&mut buf)
        .unwrap();
    let data = mounted
        .read_entry("TestGame/Content/Packed.uasset", &mut buf)
        .unwrap();
    assert_eq!(data, payload);
}

#[test]
fn mount_point_prefix_variants_all_resolve() {
    init_log();
    let mut pak = PakBuilder::new().create("../../../TestGame/", Compression::None);
    pak.add_entry("Content/A.uasset", vec![9]).unwrap();
    let mut buf = Cursor::new(Vec::new());
    pak.save::<Cursor<Vec<u8>>, _>(&mut buf, None).unwrap();

    buf.set_position(0);
    let mounted = PakBuilder::new().mount(&mut buf).unwrap();
    assert!(mounted.has_entry("TestGame/Content/A.uasset"));
    assert!(mounted.has_entry("../../../TestGame/Content/A.uasset"));
}
