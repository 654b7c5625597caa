//! In-test archive builders.

#![allow(dead_code)]

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::path::Path;

/// 1980-01-01, the DOS epoch.
const DOS_DATE: u16 = (1 << 5) | 1;

/// Writes a single-disk zip archive member by member.
#[derive(Default)]
pub struct ZipBuilder {
    data: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl ZipBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(self, name: &str, content: &[u8]) -> Self {
        let crc = crc32(content);
        self.raw(name, 0, content, content.len(), crc)
    }

    pub fn deflated(self, name: &str, content: &[u8]) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        let compressed = encoder.finish().unwrap();
        let crc = crc32(content);
        self.raw(name, 8, &compressed, content.len(), crc)
    }

    pub fn directory(self, name: &str) -> Self {
        self.raw(name, 0, b"", 0, 0)
    }

    /// A member with caller-chosen method and CRC.
    pub fn raw(self, name: &str, method: u16, payload: &[u8], size: usize, crc: u32) -> Self {
        self.member(name, method, payload, size as u32, crc, &[])
    }

    /// A DEFLATE member whose central record claims `claimed` bytes through
    /// a ZIP64 extra field.
    pub fn zip64_claimed(self, name: &str, content: &[u8], claimed: u64) -> Self {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content).unwrap();
        let compressed = encoder.finish().unwrap();
        let mut extra = Vec::new();
        extra.write_u16::<LittleEndian>(0x0001).unwrap();
        extra.write_u16::<LittleEndian>(8).unwrap();
        extra.write_u64::<LittleEndian>(claimed).unwrap();
        self.member(name, 8, &compressed, 0xFFFF_FFFF, crc32(content), &extra)
    }

    fn member(
        mut self,
        name: &str,
        method: u16,
        payload: &[u8],
        size: u32,
        crc: u32,
        central_extra: &[u8],
    ) -> Self {
        let offset = self.data.len() as u32;

        let d = &mut self.data;
        d.extend_from_slice(b"PK\x03\x04");
        d.write_u16::<LittleEndian>(20).unwrap();
        d.write_u16::<LittleEndian>(0).unwrap();
        d.write_u16::<LittleEndian>(method).unwrap();
        d.write_u16::<LittleEndian>(0).unwrap();
        d.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        d.write_u32::<LittleEndian>(crc).unwrap();
        d.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        d.write_u32::<LittleEndian>(size).unwrap();
        d.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        d.write_u16::<LittleEndian>(0).unwrap();
        d.extend_from_slice(name.as_bytes());
        d.extend_from_slice(payload);

        let c = &mut self.central;
        c.extend_from_slice(b"PK\x01\x02");
        c.write_u16::<LittleEndian>((3 << 8) | 20).unwrap();
        c.write_u16::<LittleEndian>(20).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(method).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        c.write_u32::<LittleEndian>(crc).unwrap();
        c.write_u32::<LittleEndian>(payload.len() as u32).unwrap();
        c.write_u32::<LittleEndian>(size).unwrap();
        c.write_u16::<LittleEndian>(name.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(central_extra.len() as u16).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        c.write_u16::<LittleEndian>(0).unwrap();
        let mode: u32 = if name.ends_with('/') { 0o040755 } else { 0o100644 };
        c.write_u32::<LittleEndian>(mode << 16).unwrap();
        c.write_u32::<LittleEndian>(offset).unwrap();
        c.extend_from_slice(name.as_bytes());
        c.extend_from_slice(central_extra);

        self.count += 1;
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut out = self.data;
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);

        out.extend_from_slice(b"PK\x05\x06");
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u16::<LittleEndian>(self.count).unwrap();
        out.write_u32::<LittleEndian>(self.central.len() as u32).unwrap();
        out.write_u32::<LittleEndian>(cd_offset).unwrap();
        out.write_u16::<LittleEndian>(0).unwrap();
        out
    }

    pub fn write(self, path: &Path) {
        std::fs::write(path, self.finish()).unwrap();
    }
}

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Writes a ustar archive.
#[derive(Default)]
pub struct TarBuilder {
    data: Vec<u8>,
}

impl TarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        self.data.extend_from_slice(&header(name, content.len() as u64, b'0'));
        self.data.extend_from_slice(content);
        pad(&mut self.data);
        self
    }

    pub fn directory(mut self, name: &str) -> Self {
        self.data.extend_from_slice(&header(name, 0, b'5'));
        self
    }

    pub fn symlink(mut self, name: &str) -> Self {
        self.data.extend_from_slice(&header(name, 0, b'2'));
        self
    }

    pub fn fifo(mut self, name: &str) -> Self {
        self.data.extend_from_slice(&header(name, 0, b'6'));
        self
    }

    /// A pax extended header applying `records` to the next member.
    pub fn pax(mut self, records: &str) -> Self {
        self.data
            .extend_from_slice(&header("PaxHeaders/next", records.len() as u64, b'x'));
        self.data.extend_from_slice(records.as_bytes());
        pad(&mut self.data);
        self
    }

    /// A member whose name is carried by a GNU `L` record.
    pub fn long_name(mut self, name: &str, content: &[u8]) -> Self {
        let mut payload = name.as_bytes().to_vec();
        payload.push(0);
        self.data
            .extend_from_slice(&header("././@LongLink", payload.len() as u64, b'L'));
        self.data.extend_from_slice(&payload);
        pad(&mut self.data);
        self.file("placeholder", content)
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.data.extend_from_slice(&[0u8; 1024]);
        self.data
    }

    pub fn write(self, path: &Path) {
        std::fs::write(path, self.finish()).unwrap();
    }
}

fn header(name: &str, size: u64, typeflag: u8) -> [u8; 512] {
    let mut block = [0u8; 512];
    let name = name.as_bytes();
    block[..name.len().min(100)].copy_from_slice(&name[..name.len().min(100)]);
    block[100..108].copy_from_slice(b"0000644\0");
    block[108..116].copy_from_slice(b"0000000\0");
    block[116..124].copy_from_slice(b"0000000\0");
    block[124..136].copy_from_slice(format!("{:011o}\0", size).as_bytes());
    block[136..148].copy_from_slice(format!("{:011o}\0", 1_600_000_000u64).as_bytes());
    block[156] = typeflag;
    block[257..263].copy_from_slice(b"ustar\0");
    block[263..265].copy_from_slice(b"00");

    block[148..156].copy_from_slice(b"        ");
    let sum: u64 = block.iter().map(|&b| b as u64).sum();
    block[148..156].copy_from_slice(format!("{:06o}\0 ", sum).as_bytes());
    block
}

fn pad(data: &mut Vec<u8>) {
    let rem = data.len() % 512;
    if rem != 0 {
        data.resize(data.len() + 512 - rem, 0);
    }
}
