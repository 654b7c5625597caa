use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

pub const BLOCK_SIZE: usize = 512;

/// Member type flags that matter to a walker.
pub mod typeflag {
    pub const REGULAR: u8 = b'0';
    pub const REGULAR_OLD: u8 = b'\0';
    pub const HARD_LINK: u8 = b'1';
    pub const SYMLINK: u8 = b'2';
    pub const CHAR_DEVICE: u8 = b'3';
    pub const BLOCK_DEVICE: u8 = b'4';
    pub const DIRECTORY: u8 = b'5';
    pub const FIFO: u8 = b'6';
    pub const CONTIGUOUS: u8 = b'7';
    pub const GNU_LONG_NAME: u8 = b'L';
    pub const GNU_LONG_LINK: u8 = b'K';
    pub const PAX_EXTENDED: u8 = b'x';
    pub const PAX_GLOBAL: u8 = b'g';
}

/// One raw 512-byte header block, decoded.
#[derive(Debug, Clone)]
pub struct TarHeader {
    pub name: String,
    pub mode: u32,
    pub size: u64,
    pub mtime: i64,
    pub typeflag: u8,
    pub prefix: String,
    pub is_ustar: bool,
}

impl TarHeader {
    /// Decode a header block; `Ok(None)` for an all-zero end marker.
    pub fn from_block(block: &[u8]) -> Result<Option<Self>> {
        if block.len() < BLOCK_SIZE {
            bail!("Truncated tar header ({} bytes)", block.len());
        }
        if block[..BLOCK_SIZE].iter().all(|&b| b == 0) {
            return Ok(None);
        }

        let recorded = parse_octal(&block[148..156]).context("header checksum")?;
        let computed = checksum(block);
        if recorded != computed {
            bail!(
                "Tar header checksum mismatch: recorded {}, computed {}",
                recorded,
                computed
            );
        }

        let magic = &block[257..263];
        // POSIX "ustar\0" carries a prefix; old GNU "ustar " reuses that area
        let is_posix = magic == b"ustar\0";
        let is_ustar = is_posix || magic == b"ustar ";

        Ok(Some(Self {
            name: field_str(&block[0..100]),
            mode: parse_octal(&block[100..108]).unwrap_or(0) as u32,
            size: parse_numeric(&block[124..136]).context("member size")?,
            mtime: parse_numeric(&block[136..148]).unwrap_or(0) as i64,
            typeflag: block[156],
            prefix: if is_posix {
                field_str(&block[345..500])
            } else {
                String::new()
            },
            is_ustar,
        }))
    }

    /// Name with the ustar prefix applied.
    pub fn path(&self) -> String {
        if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.name)
        }
    }
}

/// A resolved archive member: long names and pax overrides applied.
#[derive(Debug, Clone)]
pub struct TarMember {
    pub name: String,
    pub size: u64,
    pub mode: u32,
    pub mtime: i64,
    pub typeflag: u8,
    /// Offset of the first data byte in the archive
    pub data_offset: u64,
}

impl TarMember {
    pub fn is_directory(&self) -> bool {
        self.typeflag == typeflag::DIRECTORY || self.name.ends_with('/')
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.mtime, 0)
    }
}

/// Types whose header is never followed by data, whatever the size field says.
pub fn is_header_only(flag: u8) -> bool {
    matches!(
        flag,
        typeflag::HARD_LINK
            | typeflag::SYMLINK
            | typeflag::CHAR_DEVICE
            | typeflag::BLOCK_DEVICE
            | typeflag::DIRECTORY
            | typeflag::FIFO
    )
}

/// Bytes occupied by `size` bytes of data once padded to whole blocks.
pub fn padded_size(size: u64) -> u64 {
    size.div_ceil(BLOCK_SIZE as u64) * BLOCK_SIZE as u64
}

/// Unsigned sum of the header with the checksum field read as spaces.
fn checksum(block: &[u8]) -> u64 {
    block[..BLOCK_SIZE]
        .iter()
        .enumerate()
        .map(|(i, &b)| if (148..156).contains(&i) { b' ' as u64 } else { b as u64 })
        .sum()
}

fn field_str(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Octal number, NUL or space terminated, surrounding blanks ignored.
fn parse_octal(field: &[u8]) -> Result<u64> {
    let text = field_str(field);
    let text = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if text.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(text, 8).with_context(|| format!("Bad octal field {:?}", text))
}

/// Octal, or GNU base-256 when the high bit of the first byte is set.
fn parse_numeric(field: &[u8]) -> Result<u64> {
    if field.first().is_some_and(|&b| b & 0x80 != 0) {
        let mut value: u64 = (field[0] & 0x7F) as u64;
        for &b in &field[1..] {
            value = value
                .checked_mul(256)
                .and_then(|v| v.checked_add(b as u64))
                .context("base-256 field overflows")?;
        }
        return Ok(value);
    }
    parse_octal(field)
}

/// Values a pax extended header can override on the next member.
#[derive(Debug, Default, Clone)]
pub struct PaxOverrides {
    pub path: Option<String>,
    pub size: Option<u64>,
    pub mtime: Option<i64>,
}

impl PaxOverrides {
    /// Parse `"<len> <key>=<value>\n"` records.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut out = Self::default();
        let mut rest = data;
        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .context("pax record without length")?;
            let len: usize = std::str::from_utf8(&rest[..space])?
                .parse()
                .context("pax record length")?;
            if len <= space || len > rest.len() {
                bail!("pax record length {} out of range", len);
            }
            let record = &rest[space + 1..len];
            let record = record.strip_suffix(b"\n").unwrap_or(record);
            if let Some(eq) = record.iter().position(|&b| b == b'=') {
                let key = &record[..eq];
                let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
                match key {
                    b"path" => out.path = Some(value),
                    b"size" => out.size = Some(value.parse().context("pax size")?),
                    // Fractional seconds are dropped
                    b"mtime" => {
                        let secs = value.split('.').next().unwrap_or("0");
                        out.mtime = secs.parse().ok();
                    }
                    _ => {}
                }
            }
            rest = &rest[len..];
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(name: &str, size: u64, flag: u8) -> Vec<u8> {
        let mut block = vec![0u8; BLOCK_SIZE];
        block[..name.len()].copy_from_slice(name.as_bytes());
        block[100..108].copy_from_slice(b"0000644\0");
        block[124..136].copy_from_slice(format!("{:011o}\0", size).as_bytes());
        block[136..148].copy_from_slice(b"14000000000\0");
        block[156] = flag;
        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        let sum = checksum(&block);
        block[148..156].copy_from_slice(format!("{:06o}\0 ", sum).as_bytes());
        block
    }

    #[test]
    fn decodes_ustar_header() {
        let block = header("dir/file.txt", 42, typeflag::REGULAR);
        let hdr = TarHeader::from_block(&block).unwrap().unwrap();
        assert_eq!(hdr.path(), "dir/file.txt");
        assert_eq!(hdr.size, 42);
        assert_eq!(hdr.mode, 0o644);
        assert!(hdr.is_ustar);
    }

    #[test]
    fn zero_block_ends_archive() {
        assert!(TarHeader::from_block(&[0u8; BLOCK_SIZE]).unwrap().is_none());
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let mut block = header("a", 1, typeflag::REGULAR);
        block[0] = b'b';
        assert!(TarHeader::from_block(&block).is_err());
    }

    #[test]
    fn base256_size() {
        let mut field = [0u8; 12];
        field[0] = 0x80;
        field[11] = 0x01;
        field[10] = 0x02;
        assert_eq!(parse_numeric(&field).unwrap(), 0x0201);
    }

    #[test]
    fn pax_records_override_path_and_size() {
        let data = b"28 path=some/very/long/name\n11 size=99\n";
        let pax = PaxOverrides::parse(data).unwrap();
        assert_eq!(pax.path.as_deref(), Some("some/very/long/name"));
        assert_eq!(pax.size, Some(99));
    }

    #[test]
    fn padding_rounds_to_blocks() {
        assert_eq!(padded_size(0), 0);
        assert_eq!(padded_size(1), 512);
        assert_eq!(padded_size(512), 512);
        assert_eq!(padded_size(513), 1024);
    }
}
