use std::collections::BTreeMap;

use fluxsector::bitstream::ChannelBits;
use fluxsector::chs::DiskCh;
use fluxsector::crc::CrcEngine;
use fluxsector::imd::{read_imd, write_imd};
use fluxsector::modulation::ModulationDescriptor;
use fluxsector::track::decode_bits;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn msb_bits(bytes: &[u8]) -> Vec<bool> {
    let mut out = Vec::new();
    for &b in bytes {
        for i in (0..8).rev() {
            out.push(false);
            out.push((b >> i) & 1 != 0);
        }
    }
    out
}

fn crc_trailer(bytes: &[u8], m: &ModulationDescriptor) -> [u8; 2] {
    let mut engine = CrcEngine::new(m.crc_params());
    engine.compute_bytes(bytes);
    (engine.get() as u16).to_be_bytes()
}

fn id_section(m: &ModulationDescriptor, track: u8, head: u8, sector: u8, size_code: u8) -> Vec<bool> {
    let id_fields = [track, head, sector, size_code];
    let mut crc_input = vec![0xFEu8];
    crc_input.extend_from_slice(&id_fields);
    let trailer = crc_trailer(&crc_input, m);

    let mut bits = m.id_address_mark.clone();
    bits.extend(msb_bits(&id_fields));
    bits.extend(msb_bits(&trailer));
    bits
}

fn data_section(m: &ModulationDescriptor, payload: &[u8]) -> Vec<bool> {
    let mut crc_input = vec![0xFBu8];
    crc_input.extend_from_slice(payload);
    let trailer = crc_trailer(&crc_input, m);

    let mut bits = m.data_address_mark.clone();
    bits.extend(msb_bits(payload));
    bits.extend(msb_bits(&trailer));
    bits
}

/// Builds a full track's worth of FM-encoded channel bits for `sector_count`
/// sectors of `bytes_per_sector` each, numbered from 1, on the given track/head.
fn synthetic_fm_track(track: u8, head: u8, sector_count: u8, bytes_per_sector: usize) -> Vec<bool> {
    let m = ModulationDescriptor::fm();
    let size_code = (bytes_per_sector / 128).trailing_zeros() as u8;

    let mut stream = Vec::new();
    for sector in 1..=sector_count {
        let id = id_section(&m, track, head, sector, size_code);
        let fill = 0x10 + sector;
        let data = data_section(&m, &vec![fill; bytes_per_sector]);
        let gap_len = m.id_to_data_half_bits as usize - id.len();

        stream.extend(id);
        stream.extend(vec![false; gap_len]);
        stream.extend(data);
        stream.extend(vec![false; 200]); // inter-sector gap
    }
    stream
}

/// Exercises the channel-bit-to-ImageDisk half of the pipeline end to end
/// (spec section 8, scenario 6): a synthetic two-sector track decodes
/// cleanly, writes to an ImageDisk image, and reads back identically.
#[test]
fn synthetic_track_round_trips_through_imd() {
    init();
    let m = ModulationDescriptor::fm();
    let stream = synthetic_fm_track(0, 0, 2, 128);
    let bits = ChannelBits::from_bits(stream.into_iter().map(|b| b as u8));

    let assembly = decode_bits(&bits, &m, DiskCh::new(0, 0), false).unwrap();
    assert_eq!(assembly.len(), 2);

    let mut tracks = BTreeMap::new();
    tracks.insert(DiskCh::new(0, 0), assembly.sectors().to_vec());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("synthetic.imd");

    let bytes = write_imd(&tracks, "29/07/2026 12:00:00", Some("synthetic test image")).unwrap();
    std::fs::write(&path, &bytes).unwrap();

    let read_back_bytes = std::fs::read(&path).unwrap();
    let read_back = read_imd(&read_back_bytes).unwrap();

    assert_eq!(read_back.len(), 1);
    let sectors = &read_back[&DiskCh::new(0, 0)];
    assert_eq!(sectors.len(), 2);
    assert_eq!(sectors[0].sector, 1);
    assert_eq!(sectors[0].data, vec![0x11u8; 128]);
    assert_eq!(sectors[1].sector, 2);
    assert_eq!(sectors[1].data, vec![0x12u8; 128]);
}

#[test]
fn multi_track_image_preserves_track_order() {
    init();
    let m = ModulationDescriptor::fm();

    let mut tracks = BTreeMap::new();
    for (track, head) in [(0u8, 0u8), (0, 1), (1, 0)] {
        let stream = synthetic_fm_track(track, head, 1, 128);
        let bits = ChannelBits::from_bits(stream.into_iter().map(|b| b as u8));
        let assembly = decode_bits(&bits, &m, DiskCh::new(track as u16, head), false).unwrap();
        assert_eq!(assembly.len(), 1);
        tracks.insert(DiskCh::new(track as u16, head), assembly.sectors().to_vec());
    }

    let bytes = write_imd(&tracks, "29/07/2026 12:00:00", None).unwrap();
    let read_back = read_imd(&bytes).unwrap();

    let chs: Vec<DiskCh> = read_back.keys().copied().collect();
    assert_eq!(chs, vec![DiskCh::new(0, 0), DiskCh::new(0, 1), DiskCh::new(1, 0)]);
}
